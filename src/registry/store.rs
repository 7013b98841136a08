//! Session registry implementation

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::protocol::{SessionId, SignalingMessage};

use super::entry::SessionEntry;

/// Central registry of live sessions.
///
/// Thread-safe via `RwLock`; routing and broadcast are read-heavy, entries
/// are only written on register/unregister and pairing updates.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and allocate its id.
    ///
    /// The returned id is globally unique; no two concurrently live
    /// sessions ever share one.
    pub async fn register(&self, tx: mpsc::Sender<SignalingMessage>) -> SessionId {
        let id = SessionId::generate();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), SessionEntry::new(tx));

        tracing::info!(session_id = %id, live = sessions.len(), "Session registered");
        id
    }

    /// Look up a session's outbound channel.
    ///
    /// Returns `None` for unknown or already-closed sessions; absence is a
    /// normal condition, never an error.
    pub async fn lookup(&self, id: &SessionId) -> Option<mpsc::Sender<SignalingMessage>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(|entry| entry.sender())
            .filter(|tx| !tx.is_closed())
    }

    /// Remove a session. Idempotent; returns `false` when the id was
    /// already gone.
    pub async fn unregister(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();

        if removed {
            tracing::info!(session_id = %id, live = sessions.len(), "Session unregistered");
        }
        removed
    }

    /// Snapshot of every live session id and its outbound channel.
    pub async fn live_sessions(&self) -> Vec<(SessionId, mpsc::Sender<SignalingMessage>)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, entry)| (id.clone(), entry.sender()))
            .collect()
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Record `peer` as `id`'s current peer (server-side mirror of the
    /// client's pairing; last announcement wins, like the introductions
    /// themselves).
    pub async fn set_paired(&self, id: &SessionId, peer: &SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.paired_peer = Some(peer.clone());
        }
    }

    /// Current peer recorded for `id`, if any.
    pub async fn paired_peer(&self, id: &SessionId) -> Option<SessionId> {
        let sessions = self.sessions.read().await;
        sessions.get(id).and_then(|entry| entry.paired_peer.clone())
    }

    /// Clear any pairing that points at `gone` (after a disconnect).
    pub async fn clear_pairings_to(&self, gone: &SessionId) {
        let mut sessions = self.sessions.write().await;
        for entry in sessions.values_mut() {
            if entry.paired_peer.as_ref() == Some(gone) {
                entry.paired_peer = None;
            }
        }
    }
}
