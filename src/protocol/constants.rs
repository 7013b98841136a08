//! Protocol-level constants
//!
//! Defaults shared by the client engine, the fallback pipeline and the
//! server configuration.

use std::time::Duration;

/// How many ticks `start_call` waits for a peer before giving up.
pub const PEER_WAIT_ATTEMPTS: u32 = 20;

/// Interval between peer-wait ticks (20 x 500ms ~= 10s total).
pub const PEER_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// A `join` is re-issued every this many peer-wait ticks.
pub const JOIN_RESEND_STRIDE: u32 = 5;

/// Interval between manifest availability probes on the consuming side.
pub const MANIFEST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum manifest availability probes before the fallback is declared
/// unavailable.
pub const MANIFEST_POLL_ATTEMPTS: u32 = 10;

/// Media containers accepted by the segment upload endpoint.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["video/webm", "video/mp4"];

/// Segments smaller than this are treated as pathological writes and
/// rejected.
pub const MIN_SEGMENT_BYTES: u64 = 1024;

/// Number of segment references a published manifest keeps.
pub const ROLLING_WINDOW_SIZE: usize = 5;

/// Per-segment target duration hint written into the manifest.
pub const TARGET_DURATION_SECS: u32 = 5;

/// Default capture cadence of the segment uploader.
pub const SEGMENT_CADENCE: Duration = Duration::from_secs(1);

/// Capacity of each session's outbound message channel. Delivery uses
/// `try_send`; a full channel drops the message rather than stalling the
/// relay.
pub const SESSION_CHANNEL_CAPACITY: usize = 64;
