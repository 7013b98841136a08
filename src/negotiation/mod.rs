//! Negotiation engine
//!
//! Drives the offer/answer/ICE cycle for one endpoint over the signaling
//! relay. The actual real-time transport (codec negotiation, bandwidth
//! estimation, NAT traversal) is an external capability behind the
//! [`MediaTransport`] and [`MediaConnector`] traits; the engine only
//! sequences descriptions and candidates and enforces the state machine in
//! [`crate::session`].

pub mod engine;
pub mod error;
pub mod transport;

pub use engine::{EngineConfig, EngineEvent, NegotiationEngine};
pub use error::{CallError, NegotiationError};
pub use transport::{MediaConnector, MediaError, MediaTransport, TransportError, TransportEvent};
