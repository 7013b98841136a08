//! Server-wide counters
//!
//! Cheap atomic counters incremented on the hot paths; a snapshot can be
//! taken at any time without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide statistics.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Sessions currently connected.
    pub sessions_connected: AtomicU64,
    /// Total sessions ever registered.
    pub sessions_total: AtomicU64,
    /// Directed messages delivered to a live target.
    pub messages_routed: AtomicU64,
    /// Directed messages dropped (unknown target, closed or full channel).
    pub messages_dropped: AtomicU64,
    /// Segments accepted and persisted.
    pub segments_accepted: AtomicU64,
    /// Segment uploads rejected (bad container, too small).
    pub segments_rejected: AtomicU64,
    /// Manifests published.
    pub manifests_published: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub sessions_connected: u64,
    pub sessions_total: u64,
    pub messages_routed: u64,
    pub messages_dropped: u64,
    pub segments_accepted: u64,
    pub segments_rejected: u64,
    pub manifests_published: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_connected.fetch_add(1, Ordering::Relaxed);
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_connected.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_accepted(&self) {
        self.segments_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_rejected(&self) {
        self.segments_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn manifest_published(&self) {
        self.manifests_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of all counters.
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            sessions_connected: self.sessions_connected.load(Ordering::Relaxed),
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            segments_accepted: self.segments_accepted.load(Ordering::Relaxed),
            segments_rejected: self.segments_rejected.load(Ordering::Relaxed),
            manifests_published: self.manifests_published.load(Ordering::Relaxed),
        }
    }
}
