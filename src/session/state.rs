//! Negotiation state machine
//!
//! One `PeerSession` lives inside each endpoint and is driven by inbound
//! signaling messages and local events. All negotiation state is private
//! to the session; single-threaded access per session is assumed.
//!
//! Invariants:
//! - an offer may be generated only from `Stable`;
//! - a remote offer is accepted only in `Stable` (glare: the earlier offer
//!   in flight wins, the incoming one is ignored without a transition);
//! - a remote answer is applied only in `HaveLocalOffer`.
//!
//! `HaveLocalOffer` doubles as the "negotiating" flag: the separate
//! boolean the browser code carried collapses into the enum, so no
//! invalid flag/state combination can exist.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::protocol::SessionId;

/// Offer/answer state relative to the current peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// No exchange outstanding; offers may be generated.
    #[default]
    Stable,
    /// A local offer is in flight, waiting for the remote answer.
    HaveLocalOffer,
    /// A remote offer has been applied and the local answer is being
    /// produced. Transient: sending the answer returns to `Stable`.
    HaveRemoteOffer,
}

/// One endpoint's signaling-session state.
#[derive(Debug, Default)]
pub struct PeerSession {
    /// Own id, known once the server's `id` message arrives.
    local_id: Option<SessionId>,

    /// Every peer announced so far. Announcements extend this set; they do
    /// not silently re-target an existing pairing.
    known_peers: BTreeSet<String>,

    /// The peer this session negotiates with.
    paired_peer: Option<SessionId>,

    state: NegotiationState,

    /// Whether the remote description has been applied to the current
    /// transport. Candidates arriving earlier are queued, not dropped.
    remote_description_set: bool,

    /// ICE candidates waiting for the remote description.
    pending_candidates: Vec<Value>,
}

impl PeerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<&SessionId> {
        self.local_id.as_ref()
    }

    pub fn paired_peer(&self) -> Option<&SessionId> {
        self.paired_peer.as_ref()
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn known_peers(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.known_peers.iter().map(|s| SessionId::from(s.as_str()))
    }

    /// Record the id assigned by the server.
    pub fn on_identity(&mut self, id: SessionId) {
        tracing::debug!(session_id = %id, "Identity assigned");
        self.local_id = Some(id);
    }

    /// Record an announced peer. Pairs with it if no pairing exists yet;
    /// otherwise only the known-peer set grows.
    pub fn on_peer_announced(&mut self, peer: SessionId) {
        if Some(&peer) == self.local_id.as_ref() {
            return;
        }
        self.known_peers.insert(peer.as_str().to_string());
        if self.paired_peer.is_none() {
            tracing::debug!(peer = %peer, "Paired with peer");
            self.paired_peer = Some(peer);
        }
    }

    /// Explicitly re-target the pairing to a known peer. Returns `false`
    /// if the peer has never been announced.
    pub fn select_peer(&mut self, peer: &SessionId) -> bool {
        if !self.known_peers.contains(peer.as_str()) {
            return false;
        }
        self.paired_peer = Some(peer.clone());
        self.reset_negotiation();
        true
    }

    /// Handle a peer-gone notice. Returns `true` when the departed peer
    /// was the paired one, in which case the caller must tear down the
    /// transport; negotiation state is already reset.
    pub fn on_peer_gone(&mut self, peer: &SessionId) -> bool {
        self.known_peers.remove(peer.as_str());
        if self.paired_peer.as_ref() == Some(peer) {
            tracing::info!(peer = %peer, "Paired peer disconnected");
            self.paired_peer = None;
            self.reset_negotiation();
            true
        } else {
            false
        }
    }

    /// Begin generating a local offer. Only legal from `Stable`.
    pub fn begin_offer(&mut self) -> bool {
        if self.state != NegotiationState::Stable {
            tracing::warn!(state = ?self.state, "Offer suppressed, negotiation not stable");
            return false;
        }
        self.state = NegotiationState::HaveLocalOffer;
        true
    }

    /// Accept a remote offer. In any state other than `Stable` the offer
    /// is glare and must be ignored; no transition happens.
    pub fn accept_remote_offer(&mut self) -> bool {
        if self.state != NegotiationState::Stable {
            tracing::warn!(state = ?self.state, "Remote offer ignored (glare)");
            return false;
        }
        self.state = NegotiationState::HaveRemoteOffer;
        true
    }

    /// The local answer was sent; the exchange is complete on this side.
    pub fn answer_sent(&mut self) {
        debug_assert_eq!(self.state, NegotiationState::HaveRemoteOffer);
        self.state = NegotiationState::Stable;
    }

    /// Apply a remote answer. Only legal in `HaveLocalOffer`; late or
    /// duplicate answers are ignored.
    pub fn accept_remote_answer(&mut self) -> bool {
        if self.state != NegotiationState::HaveLocalOffer {
            tracing::warn!(state = ?self.state, "Remote answer ignored");
            return false;
        }
        self.state = NegotiationState::Stable;
        true
    }

    /// The remote description was applied to the transport; queued
    /// candidates may now be drained.
    pub fn remote_description_applied(&mut self) {
        self.remote_description_set = true;
    }

    /// Queue a candidate that arrived before the remote description.
    pub fn queue_candidate(&mut self, candidate: Value) {
        self.pending_candidates.push(candidate);
    }

    /// Take every queued candidate for application to the transport.
    pub fn drain_candidates(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.pending_candidates)
    }

    /// Reset negotiation after a transport teardown. The pairing itself is
    /// untouched; `on_peer_gone` clears that separately.
    pub fn reset_negotiation(&mut self) {
        self.state = NegotiationState::Stable;
        self.remote_description_set = false;
        self.pending_candidates.clear();
    }
}
