//! Per-session registry entry

use std::time::Instant;

use tokio::sync::mpsc;

use crate::protocol::{SessionId, SignalingMessage};

/// Entry for a single registered session.
#[derive(Debug)]
pub struct SessionEntry {
    /// Outbound message sink, drained by the session's websocket writer.
    pub(super) tx: mpsc::Sender<SignalingMessage>,

    /// Server-side mirror of the session's current peer, maintained by the
    /// join introductions. Used to address manifest notifications.
    pub paired_peer: Option<SessionId>,

    /// When the session registered.
    pub connected_at: Instant,
}

impl SessionEntry {
    pub(super) fn new(tx: mpsc::Sender<SignalingMessage>) -> Self {
        Self {
            tx,
            paired_peer: None,
            connected_at: Instant::now(),
        }
    }

    /// Clone of the outbound sender.
    pub fn sender(&self) -> mpsc::Sender<SignalingMessage> {
        self.tx.clone()
    }

    /// Session age.
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
