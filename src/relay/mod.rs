//! Signaling relay
//!
//! Routes directed messages between registered sessions and fans out
//! broadcast events (peer introductions, disconnect notices) over the
//! [`SessionRegistry`](crate::registry::SessionRegistry).
//!
//! Delivery is at-most-once, best-effort by design: an unknown target, a
//! closed channel or a full channel all drop the message silently. The
//! sender is never told; the taxonomy calls this `TargetUnavailable` and
//! the drop is only debug-logged and counted.
//!
//! `handle_join` produces *pairwise* introductions across every registered
//! session, not a strict 1:1 pairing. With more than two simultaneous
//! sessions each client's "current peer" is whatever announcement it saw
//! last, so correct pairing is only guaranteed for exactly two sessions.
//! Known limitation, kept intentionally; the client side mitigates it by
//! tracking the full peer set (see `session::PeerSession`).

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::{SessionId, SignalingMessage};
use crate::registry::SessionRegistry;
use crate::stats::RelayStats;

/// Message router over the session registry.
#[derive(Debug, Clone)]
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
    stats: Arc<RelayStats>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>, stats: Arc<RelayStats>) -> Self {
        Self { registry, stats }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Route a directed message from `sender`.
    ///
    /// Stamps `senderId` and delivers to the target's channel. Messages
    /// without a target, or whose target is unavailable, are dropped
    /// without surfacing an error to the sender.
    pub async fn route(&self, sender: &SessionId, mut msg: SignalingMessage) {
        let Some(target) = msg.target_id().cloned() else {
            tracing::debug!(session_id = %sender, kind = msg.kind(), "Undirected message ignored");
            return;
        };

        msg.set_sender(sender.clone());

        let Some(tx) = self.registry.lookup(&target).await else {
            tracing::debug!(
                session_id = %sender,
                target = %target,
                kind = msg.kind(),
                "Target unavailable, message dropped"
            );
            self.stats.message_dropped();
            return;
        };

        self.deliver(&target, tx, msg);
    }

    /// Introduce `joining` to every other registered session, both ways.
    pub async fn handle_join(&self, joining: &SessionId) {
        let Some(join_tx) = self.registry.lookup(joining).await else {
            return;
        };

        let others: Vec<_> = self
            .registry
            .live_sessions()
            .await
            .into_iter()
            .filter(|(id, _)| id != joining)
            .collect();

        for (id, tx) in others {
            self.deliver(
                &id,
                tx,
                SignalingMessage::Peer {
                    peer_id: joining.clone(),
                },
            );
            self.deliver(
                joining,
                join_tx.clone(),
                SignalingMessage::Peer {
                    peer_id: id.clone(),
                },
            );

            // Mirror the pairing the announcements imply so manifest
            // notifications can be addressed later. Last announcement wins,
            // same as on the client.
            self.registry.set_paired(&id, joining).await;
            self.registry.set_paired(joining, &id).await;
        }
    }

    /// Unregister a session and tell everyone left.
    ///
    /// Idempotent: a second call for the same id does nothing, so no
    /// duplicate `peerDisconnected` broadcasts are possible.
    pub async fn handle_disconnect(&self, id: &SessionId) {
        if !self.registry.unregister(id).await {
            return;
        }

        self.registry.clear_pairings_to(id).await;

        for (peer, tx) in self.registry.live_sessions().await {
            self.deliver(
                &peer,
                tx,
                SignalingMessage::PeerDisconnected {
                    peer_id: id.clone(),
                },
            );
        }
    }

    /// Tell `owner`'s paired peer that a fallback manifest is available.
    pub async fn notify_manifest(&self, owner: &SessionId, msg: SignalingMessage) {
        let Some(peer) = self.registry.paired_peer(owner).await else {
            tracing::debug!(session_id = %owner, "No paired peer for manifest notification");
            return;
        };

        let Some(tx) = self.registry.lookup(&peer).await else {
            tracing::debug!(session_id = %owner, peer = %peer, "Paired peer gone, notification dropped");
            self.stats.message_dropped();
            return;
        };

        self.deliver(&peer, tx, msg);
    }

    /// Non-blocking send into a session channel; a full or closed channel
    /// drops the message.
    fn deliver(
        &self,
        target: &SessionId,
        tx: tokio::sync::mpsc::Sender<SignalingMessage>,
        msg: SignalingMessage,
    ) {
        let kind = msg.kind();
        match tx.try_send(msg) {
            Ok(()) => {
                self.stats.message_routed();
                tracing::trace!(target = %target, kind, "Message delivered");
            }
            Err(TrySendError::Full(_)) => {
                self.stats.message_dropped();
                tracing::warn!(target = %target, kind, "Session channel full, message dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.message_dropped();
                tracing::debug!(target = %target, kind, "Session channel closed, message dropped");
            }
        }
    }
}
