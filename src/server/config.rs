//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Root directory for published fallback media
    pub media_root: PathBuf,

    /// Capacity of each session's outbound message channel
    pub channel_capacity: usize,

    /// Content types accepted by the segment upload endpoint
    pub accepted_content_types: Vec<String>,

    /// Minimum plausible segment size in bytes
    pub min_segment_bytes: u64,

    /// Rolling manifest window size
    pub window_size: usize,

    /// Per-segment target duration hint
    pub target_duration: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".parse().unwrap(),
            media_root: PathBuf::from("media"),
            channel_capacity: SESSION_CHANNEL_CAPACITY,
            accepted_content_types: ACCEPTED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_segment_bytes: MIN_SEGMENT_BYTES,
            window_size: ROLLING_WINDOW_SIZE,
            target_duration: Duration::from_secs(TARGET_DURATION_SECS as u64),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the fallback media root directory
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    /// Set the per-session channel capacity (minimum 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the minimum plausible segment size
    pub fn min_segment_bytes(mut self, min: u64) -> Self {
        self.min_segment_bytes = min;
        self
    }

    /// Set the rolling manifest window size (minimum 1)
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }
}
