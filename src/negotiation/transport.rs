//! External media transport seam
//!
//! The peer-to-peer engine is out of scope for this crate: it appears
//! here as an opaque connection object that can produce and apply session
//! descriptions, accept trickle-ICE candidates, and report events. A
//! production embedder backs these traits with a real RTC stack; tests
//! use mocks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Event signaled by the external transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local ICE candidate was discovered and should be forwarded to the
    /// paired peer.
    LocalCandidate(Value),
    /// New local media tracks were attached to an established transport;
    /// triggers renegotiation.
    TracksAdded,
    /// Connectivity was lost or could not be established.
    ConnectionFailed,
}

/// Error from a transport operation.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The operation is not valid in the transport's current state
    /// (e.g. a candidate before the remote description).
    InvalidState(String),
    /// The transport failed outright.
    Failed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidState(reason) => {
                write!(f, "Transport in invalid state: {}", reason)
            }
            TransportError::Failed(reason) => write!(f, "Transport failed: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Error acquiring local media or building the transport.
#[derive(Debug, Clone)]
pub enum MediaError {
    /// The user denied camera/microphone access. Terminal for the call.
    AcquisitionDenied,
    /// No capture device is present. Terminal for the call.
    DeviceMissing,
    /// Any other setup failure.
    Setup(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::AcquisitionDenied => {
                write!(f, "Camera/microphone access denied")
            }
            MediaError::DeviceMissing => write!(f, "No camera/microphone found"),
            MediaError::Setup(reason) => write!(f, "Media setup failed: {}", reason),
        }
    }
}

impl std::error::Error for MediaError {}

/// Opaque peer transport, owned by the external real-time media engine.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create a local offer and install it as the local description.
    async fn create_offer(&self) -> Result<Value, TransportError>;

    /// Create a local answer to the currently applied remote offer and
    /// install it as the local description.
    async fn create_answer(&self) -> Result<Value, TransportError>;

    /// Apply a remote offer or answer.
    async fn apply_remote_description(&self, description: Value) -> Result<(), TransportError>;

    /// Apply a remote trickle-ICE candidate.
    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), TransportError>;

    /// Tear the transport down. Infallible and idempotent.
    async fn close(&self);
}

/// Factory for [`MediaTransport`]s.
///
/// `connect` acquires local media and builds the transport; events are
/// pushed into the supplied channel for the lifetime of the connection.
#[async_trait]
pub trait MediaConnector: Send + Sync {
    type Transport: MediaTransport + 'static;

    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<Self::Transport>, MediaError>;
}
