//! Segment store
//!
//! Persists uploaded media segments per session under a media root,
//! maintains each session's rolling manifest and publishes it atomically
//! (temp-write then rename) so readers never observe a half-written
//! playlist. One mutex per session serializes that session's writes
//! without stalling other sessions.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::protocol::{constants, SessionId};

use super::error::FallbackError;
use super::manifest::{Manifest, SegmentRef};

/// Result of a successful segment ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSegment {
    pub sequence: u64,
    /// Manifest path relative to the media root's mount point, suitable
    /// for handing to the consuming peer.
    pub manifest_path: String,
}

#[derive(Debug)]
struct SessionMedia {
    dir: PathBuf,
    next_sequence: u64,
    manifest: Manifest,
}

#[derive(Debug, Default)]
struct Sessions {
    live: HashMap<SessionId, Arc<Mutex<SessionMedia>>>,
    /// Ids whose media was already cleaned up. A retried upload racing
    /// the disconnect must not resurrect the directory.
    removed: HashSet<SessionId>,
}

/// Per-session segment persistence and manifest publication.
pub struct SegmentStore {
    root: PathBuf,
    min_segment_bytes: u64,
    window_size: usize,
    target_duration_secs: u32,
    accepted_content_types: Vec<String>,
    sessions: RwLock<Sessions>,
}

impl SegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_segment_bytes: constants::MIN_SEGMENT_BYTES,
            window_size: constants::ROLLING_WINDOW_SIZE,
            target_duration_secs: constants::TARGET_DURATION_SECS,
            accepted_content_types: constants::ACCEPTED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sessions: RwLock::new(Sessions::default()),
        }
    }

    pub fn with_limits(mut self, min_segment_bytes: u64, window_size: usize) -> Self {
        self.min_segment_bytes = min_segment_bytes;
        self.window_size = window_size;
        self
    }

    /// Replace the set of accepted media container content types.
    pub fn accepted_content_types(mut self, types: Vec<String>) -> Self {
        self.accepted_content_types = types;
        self
    }

    /// Set the per-segment target duration hint written into manifests.
    pub fn target_duration(mut self, duration: Duration) -> Self {
        self.target_duration_secs = duration.as_secs().max(1) as u32;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ingest one uploaded segment for `session_id`.
    ///
    /// Validates the content type and persisted size, appends the segment
    /// to the session's rolling window, deletes the evicted segment file
    /// and republishes the manifest. Returns the manifest's relative path.
    pub async fn accept_segment(
        &self,
        session_id: &SessionId,
        content_type: &str,
        data: &[u8],
    ) -> Result<AcceptedSegment, FallbackError> {
        let extension = self
            .extension_for(content_type)
            .ok_or_else(|| FallbackError::InvalidSegmentFormat(content_type.to_string()))?;

        let media = self.session_media(session_id).await?;
        let mut media = media.lock().await;

        let sequence = media.next_sequence;
        let file_name = format!("segment-{:05}.{}", sequence, extension);
        let path = media.dir.join(&file_name);

        tokio::fs::write(&path, data).await?;

        // Verify what actually hit the disk, not the request body length.
        let persisted = tokio::fs::metadata(&path).await?.len();
        if persisted < self.min_segment_bytes {
            tokio::fs::remove_file(&path).await.ok();
            tracing::warn!(
                session_id = %session_id,
                size = persisted,
                "Rejected undersized segment"
            );
            return Err(FallbackError::SegmentTooSmall {
                size: persisted,
                min: self.min_segment_bytes,
            });
        }

        media.next_sequence += 1;
        let evicted = media.manifest.push(SegmentRef {
            sequence,
            file_name,
            size_bytes: persisted,
        });
        if let Some(old) = evicted {
            let old_path = media.dir.join(&old.file_name);
            if let Err(e) = tokio::fs::remove_file(&old_path).await {
                tracing::warn!(path = %old_path.display(), error = %e, "Failed to delete aged-out segment");
            }
        }

        self.publish_manifest(&media).await?;

        tracing::debug!(
            session_id = %session_id,
            sequence,
            size = persisted,
            "Segment accepted"
        );

        Ok(AcceptedSegment {
            sequence,
            manifest_path: format!("media/{}/playlist.m3u8", session_id),
        })
    }

    /// Read the current published manifest text, if the session has one.
    pub async fn manifest_text(&self, session_id: &SessionId) -> Option<String> {
        let media = {
            let sessions = self.sessions.read().await;
            sessions.live.get(session_id)?.clone()
        };
        let media = media.lock().await;
        if media.manifest.is_empty() {
            return None;
        }
        Some(media.manifest.render())
    }

    /// Delete a session's media directory and forget its state.
    ///
    /// Takes the session's write lock first so an in-flight ingest
    /// finishes before the directory disappears under it. The id is
    /// tombstoned: later uploads for it are rejected instead of
    /// recreating the directory.
    pub async fn remove_session(&self, session_id: &SessionId) {
        let media = {
            let mut sessions = self.sessions.write().await;
            sessions.removed.insert(session_id.clone());
            sessions.live.remove(session_id)
        };
        let Some(media) = media else {
            return;
        };

        let media = media.lock().await;
        if let Err(e) = tokio::fs::remove_dir_all(&media.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to remove media directory");
            }
        } else {
            tracing::info!(session_id = %session_id, "Removed media directory");
        }
    }

    async fn session_media(
        &self,
        session_id: &SessionId,
    ) -> Result<Arc<Mutex<SessionMedia>>, FallbackError> {
        {
            let sessions = self.sessions.read().await;
            if sessions.removed.contains(session_id) {
                return Err(FallbackError::SessionClosed(session_id.clone()));
            }
            if let Some(media) = sessions.live.get(session_id) {
                return Ok(media.clone());
            }
        }

        let dir = self.root.join(session_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let mut sessions = self.sessions.write().await;
        // The disconnect may have won the race between the locks; back
        // out the directory we just created instead of resurrecting it.
        if sessions.removed.contains(session_id) {
            tokio::fs::remove_dir_all(&dir).await.ok();
            return Err(FallbackError::SessionClosed(session_id.clone()));
        }
        if let Some(media) = sessions.live.get(session_id) {
            return Ok(media.clone());
        }
        let media = Arc::new(Mutex::new(SessionMedia {
            dir,
            next_sequence: 0,
            manifest: Manifest::new(self.window_size, self.target_duration_secs),
        }));
        sessions.live.insert(session_id.clone(), media.clone());
        Ok(media)
    }

    async fn publish_manifest(&self, media: &SessionMedia) -> Result<(), FallbackError> {
        let rendered = media.manifest.render();
        let tmp = media.dir.join("playlist.m3u8.tmp");
        let published = media.dir.join("playlist.m3u8");
        tokio::fs::write(&tmp, rendered.as_bytes()).await?;
        tokio::fs::rename(&tmp, &published).await?;
        Ok(())
    }

    fn extension_for(&self, content_type: &str) -> Option<String> {
        // Parameters like `video/webm;codecs=vp8` are fine.
        let essence = content_type.split(';').next().unwrap_or("").trim();
        if !self.accepted_content_types.iter().any(|t| t == essence) {
            return None;
        }
        essence.split('/').nth(1).map(|s| s.to_string())
    }
}
