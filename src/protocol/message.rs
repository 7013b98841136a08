//! Signaling message types
//!
//! The wire format is an internally tagged JSON object. Session
//! descriptions and ICE candidates are opaque to the relay and carried as
//! raw JSON values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque session identifier, one per live websocket connection.
///
/// Generated server-side as a uuid-v4 string and handed to the client in
/// the `id` message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh globally-unique id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A signaling message, tagged by its `type` field on the wire.
///
/// `Offer`, `Answer` and `Candidate` are directed: clients set `targetId`,
/// and the relay stamps `senderId` on delivery so the receiver can
/// attribute the message. A session must ignore anything whose `senderId`
/// equals its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SignalingMessage {
    /// Server -> client, once per connection.
    Id { client_id: SessionId },

    /// Client -> server: announce readiness to be introduced to peers.
    Join,

    /// Server -> client: another session is present.
    Peer { peer_id: SessionId },

    /// Server -> client: a session went away.
    PeerDisconnected { peer_id: SessionId },

    /// Session description offer, relayed between peers.
    Offer {
        offer: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<SessionId>,
    },

    /// Session description answer, relayed between peers.
    Answer {
        answer: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<SessionId>,
    },

    /// Trickle-ICE candidate, relayed between peers.
    Candidate {
        candidate: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<SessionId>,
    },

    /// Server -> client: a rolling HLS playlist for `peer_id`'s feed is
    /// available at the given relative path.
    HlsPlaylist { peer_id: SessionId, playlist: String },

    /// Server -> client: a DASH manifest for `peer_id`'s feed is available
    /// at the given relative path.
    DashManifest { peer_id: SessionId, manifest: String },
}

impl SignalingMessage {
    /// Target of a directed message, if any.
    pub fn target_id(&self) -> Option<&SessionId> {
        match self {
            SignalingMessage::Offer { target_id, .. }
            | SignalingMessage::Answer { target_id, .. }
            | SignalingMessage::Candidate { target_id, .. } => target_id.as_ref(),
            _ => None,
        }
    }

    /// Sender stamped by the relay on delivery, if any.
    pub fn sender_id(&self) -> Option<&SessionId> {
        match self {
            SignalingMessage::Offer { sender_id, .. }
            | SignalingMessage::Answer { sender_id, .. }
            | SignalingMessage::Candidate { sender_id, .. } => sender_id.as_ref(),
            _ => None,
        }
    }

    /// Stamp the sender on a directed message. No-op for broadcast and
    /// server-originated variants.
    pub fn set_sender(&mut self, id: SessionId) {
        match self {
            SignalingMessage::Offer { sender_id, .. }
            | SignalingMessage::Answer { sender_id, .. }
            | SignalingMessage::Candidate { sender_id, .. } => *sender_id = Some(id),
            _ => {}
        }
    }

    /// Whether this message is routed point-to-point via `targetId`.
    pub fn is_directed(&self) -> bool {
        self.target_id().is_some()
    }

    /// Short name of the wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Id { .. } => "id",
            SignalingMessage::Join => "join",
            SignalingMessage::Peer { .. } => "peer",
            SignalingMessage::PeerDisconnected { .. } => "peerDisconnected",
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
            SignalingMessage::HlsPlaylist { .. } => "hlsPlaylist",
            SignalingMessage::DashManifest { .. } => "dashManifest",
        }
    }
}
