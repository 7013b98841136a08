//! Relay server
//!
//! HTTP/websocket front of the crate: websocket signaling at `/ws`,
//! fallback segment uploads at `/upload-video/{session_id}` and published
//! media served statically under `/media`.

pub mod config;
pub mod router;
mod ws;

pub use config::ServerConfig;
pub use router::{build_router, AppState, RelayServer};
