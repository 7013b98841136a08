//! Peer-to-peer video call signaling relay with a server-relayed fallback.
//!
//! The relay introduces websocket clients to each other, routes their
//! offer/answer/ICE exchange without inspecting it, and, when direct
//! connectivity fails, ingests uploaded media segments and republishes
//! them as a rolling manifest served over HTTP.
//!
//! # Architecture
//!
//! ```text
//!    [Client A] ◄──ws──► ┌──────────────────────┐ ◄──ws──► [Client B]
//!                        │      RelayServer     │
//!    NegotiationEngine   │  ┌────────────────┐  │   NegotiationEngine
//!    PeerSession         │  │ SignalingRelay │  │   PeerSession
//!         │              │  │ SessionRegistry│  │        │
//!         ▼              │  └────────────────┘  │        ▼
//!    MediaTransport      │  ┌────────────────┐  │   MediaTransport
//!    (external RTC)      │  │  SegmentStore  │  │   (external RTC)
//!                        │  │  /upload-video │  │
//!    SegmentUploader ──► │  │  /media (HLS)  │  │ ◄── ManifestConsumer
//!      (fallback)        │  └────────────────┘  │     (fallback)
//!                        └──────────────────────┘
//! ```
//!
//! The relay is deliberately dumb: session descriptions and candidates
//! are opaque JSON, routing is at-most-once and best-effort, and the
//! negotiation state machine lives entirely in the clients.

pub mod error;
pub mod fallback;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use protocol::{SessionId, SignalingMessage};
pub use relay::SignalingRelay;
pub use server::{RelayServer, ServerConfig};
