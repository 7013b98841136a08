//! Client-side session state
//!
//! Tracks one endpoint's view of the signaling session: its own id, the
//! peers it knows about, which peer it is paired with, and the
//! offer/answer negotiation state relative to that peer.

pub mod state;

pub use state::{NegotiationState, PeerSession};
