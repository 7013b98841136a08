//! Signaling wire protocol
//!
//! JSON messages exchanged over the persistent websocket channel between
//! each endpoint and the relay. The schema matches what browsers and the
//! relay actually put on the wire: an object with a `type` tag plus
//! camelCase fields, with `targetId` on outbound directed messages and
//! `senderId` stamped by the relay on delivery.

pub mod constants;
pub mod message;

pub use message::{SessionId, SignalingMessage};
