//! Rolling manifest model
//!
//! A manifest is a rolling window over the most recent segments of one
//! session's feed, rendered as an HLS media playlist. The window is the
//! in-memory truth; rendering is a pure function of it.

use crate::protocol::constants;

/// One published segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    /// Monotonic sequence number, unique within the session.
    pub sequence: u64,
    /// File name relative to the session's media directory.
    pub file_name: String,
    /// Size as persisted on disk.
    pub size_bytes: u64,
}

/// Rolling window of segment references for one session.
#[derive(Debug, Clone)]
pub struct Manifest {
    window_size: usize,
    target_duration_secs: u32,
    segments: Vec<SegmentRef>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(constants::ROLLING_WINDOW_SIZE, constants::TARGET_DURATION_SECS)
    }
}

impl Manifest {
    pub fn new(window_size: usize, target_duration_secs: u32) -> Self {
        Self {
            window_size,
            target_duration_secs,
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[SegmentRef] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Media sequence of the oldest segment still in the window.
    pub fn media_sequence(&self) -> u64 {
        self.segments.first().map(|s| s.sequence).unwrap_or(0)
    }

    /// Append a segment, evicting the oldest once the window is full.
    /// Returns the evicted segment so its file can be deleted.
    pub fn push(&mut self, segment: SegmentRef) -> Option<SegmentRef> {
        self.segments.push(segment);
        if self.segments.len() > self.window_size {
            Some(self.segments.remove(0))
        } else {
            None
        }
    }

    /// Render the window as an HLS media playlist.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(128 + self.segments.len() * 64);
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str(&format!(
            "#EXT-X-TARGETDURATION:{}\n",
            self.target_duration_secs
        ));
        out.push_str(&format!(
            "#EXT-X-MEDIA-SEQUENCE:{}\n",
            self.media_sequence()
        ));
        for segment in &self.segments {
            out.push_str(&format!("#EXTINF:{}.0,\n", self.target_duration_secs));
            out.push_str(&segment.file_name);
            out.push('\n');
        }
        out
    }
}
