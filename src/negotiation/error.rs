//! Negotiation error types

use std::fmt;

use super::transport::{MediaError, TransportError};

/// Error while processing signaling or transport events.
///
/// Protocol anomalies (glare, late answers, unknown senders) are absorbed
/// and logged, not reported here; this type covers the failures the
/// embedder must act on.
#[derive(Debug)]
pub enum NegotiationError {
    /// The outbound signaling channel is gone; the session is over.
    SignalingClosed,
    /// The external transport rejected an operation.
    Transport(TransportError),
    /// Media acquisition failed while building a transport.
    Media(MediaError),
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::SignalingClosed => write!(f, "Signaling channel closed"),
            NegotiationError::Transport(e) => write!(f, "{}", e),
            NegotiationError::Media(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NegotiationError {}

/// Error starting a call.
#[derive(Debug)]
pub enum CallError {
    /// The bounded peer wait elapsed with no peer announced.
    NoPeerAvailable,
    /// The outbound signaling channel is gone.
    SignalingClosed,
    /// The external transport rejected an operation.
    Transport(TransportError),
    /// Media acquisition failed (denied, missing device, setup).
    Media(MediaError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::NoPeerAvailable => write!(f, "No peer available"),
            CallError::SignalingClosed => write!(f, "Signaling channel closed"),
            CallError::Transport(e) => write!(f, "{}", e),
            CallError::Media(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CallError {}

impl From<NegotiationError> for CallError {
    fn from(e: NegotiationError) -> Self {
        match e {
            NegotiationError::SignalingClosed => CallError::SignalingClosed,
            NegotiationError::Transport(e) => CallError::Transport(e),
            NegotiationError::Media(e) => CallError::Media(e),
        }
    }
}

impl From<MediaError> for CallError {
    fn from(e: MediaError) -> Self {
        CallError::Media(e)
    }
}
