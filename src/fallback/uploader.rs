//! Segment uploader
//!
//! Client-side half of the fallback pipeline: pulls captured media
//! segments from a [`MediaFeed`] on a fixed cadence and pushes them to a
//! [`SegmentSink`] (normally the relay's upload endpoint over HTTP).
//!
//! Failure handling:
//! - transient push failures are retried a bounded number of times with
//!   exponential backoff;
//! - rejections (bad format, undersized) are never retried, the segment
//!   is dropped;
//! - a run of consecutive segment losses widens the capture cadence
//!   (halving the upload rate) until a success restores it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::protocol::{constants, SessionId};

use super::error::FallbackError;

/// One captured media segment.
#[derive(Debug, Clone)]
pub struct MediaSegment {
    pub content_type: String,
    pub data: Bytes,
}

/// Source of captured segments, normally a recorder slicing a live feed.
#[async_trait]
pub trait MediaFeed: Send {
    /// Next captured segment, or `None` when capture has ended.
    async fn next_segment(&mut self) -> Option<MediaSegment>;
}

/// Destination for captured segments.
#[async_trait]
pub trait SegmentSink: Send + Sync {
    async fn push_segment(&self, segment: &MediaSegment) -> Result<(), FallbackError>;
}

/// Retry and backpressure tuning for the uploader.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Push attempts per segment (first try included).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per subsequent retry.
    pub initial_backoff: Duration,
    /// Consecutive lost segments before the cadence widens.
    pub failure_threshold: u32,
    /// Capture cadence under normal operation.
    pub cadence: Duration,
    /// Ceiling for the widened cadence.
    pub max_cadence: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            failure_threshold: 3,
            cadence: constants::SEGMENT_CADENCE,
            max_cadence: constants::SEGMENT_CADENCE * 8,
        }
    }
}

/// Outcome summary of one uploader run, for the embedder's logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub segments_sent: u64,
    pub segments_lost: u64,
}

/// Drives segment capture and upload until the feed ends.
pub struct SegmentUploader<F, S> {
    feed: F,
    sink: S,
    policy: UploadPolicy,
}

impl<F: MediaFeed, S: SegmentSink> SegmentUploader<F, S> {
    pub fn new(feed: F, sink: S) -> Self {
        Self::with_policy(feed, sink, UploadPolicy::default())
    }

    pub fn with_policy(feed: F, sink: S, policy: UploadPolicy) -> Self {
        Self { feed, sink, policy }
    }

    /// Run until the feed is exhausted.
    pub async fn run(mut self) -> UploadReport {
        let mut report = UploadReport::default();
        let mut cadence = self.policy.cadence;
        let mut consecutive_losses = 0u32;

        while let Some(segment) = self.feed.next_segment().await {
            match self.push_with_retry(&segment).await {
                Ok(()) => {
                    report.segments_sent += 1;
                    consecutive_losses = 0;
                    if cadence != self.policy.cadence {
                        tracing::info!("Upload recovered, restoring cadence");
                        cadence = self.policy.cadence;
                    }
                }
                Err(e) => {
                    report.segments_lost += 1;
                    tracing::warn!(error = %e, "Segment lost");
                    if !e.is_rejection() {
                        consecutive_losses += 1;
                        if consecutive_losses >= self.policy.failure_threshold {
                            let widened = (cadence * 2).min(self.policy.max_cadence);
                            if widened != cadence {
                                tracing::warn!(
                                    cadence_ms = widened.as_millis() as u64,
                                    "Upload struggling, widening cadence"
                                );
                                cadence = widened;
                            }
                        }
                    }
                }
            }
            tokio::time::sleep(cadence).await;
        }

        tracing::info!(
            sent = report.segments_sent,
            lost = report.segments_lost,
            "Capture feed ended"
        );
        report
    }

    async fn push_with_retry(&self, segment: &MediaSegment) -> Result<(), FallbackError> {
        let mut backoff = self.policy.initial_backoff;
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.sink.push_segment(segment).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_rejection() => {
                    // Our segment's fault; retrying sends the same bytes.
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Segment push failed");
                    last_err = Some(e);
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| FallbackError::WorkerFailure("no attempts made".into())))
    }
}

/// Pushes segments to the relay's upload endpoint over HTTP.
pub struct HttpSegmentSink {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpSegmentSink {
    /// `base_url` is the relay's HTTP root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str, session_id: &SessionId) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: format!(
                "{}/upload-video/{}",
                base_url.trim_end_matches('/'),
                session_id
            ),
        }
    }
}

#[async_trait]
impl SegmentSink for HttpSegmentSink {
    async fn push_segment(&self, segment: &MediaSegment) -> Result<(), FallbackError> {
        let response = self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::CONTENT_TYPE, &segment.content_type)
            .body(segment.data.clone())
            .send()
            .await
            .map_err(|e| FallbackError::WorkerFailure(format!("upload request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::BAD_REQUEST {
            // A 400 is the endpoint rejecting the segment itself;
            // retrying would resend the same bytes.
            Err(FallbackError::UploadRejected(body))
        } else {
            Err(FallbackError::WorkerFailure(format!(
                "upload endpoint returned {}: {}",
                status, body
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    struct ScriptedFeed {
        segments: Vec<MediaSegment>,
    }

    impl ScriptedFeed {
        fn of(count: usize) -> Self {
            let segments = (0..count)
                .map(|n| MediaSegment {
                    content_type: "video/webm".to_string(),
                    data: Bytes::from(vec![n as u8; 32]),
                })
                .collect();
            Self { segments }
        }
    }

    #[async_trait]
    impl MediaFeed for ScriptedFeed {
        async fn next_segment(&mut self) -> Option<MediaSegment> {
            if self.segments.is_empty() {
                None
            } else {
                Some(self.segments.remove(0))
            }
        }
    }

    /// Sink that fails according to a script of outcomes per call.
    #[derive(Clone)]
    struct ScriptedSink {
        outcomes: Arc<Mutex<Vec<Result<(), FallbackError>>>>,
        calls: Arc<AtomicU64>,
    }

    impl ScriptedSink {
        fn new(outcomes: Vec<Result<(), FallbackError>>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes)),
                calls: Arc::new(AtomicU64::new(0)),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SegmentSink for ScriptedSink {
        async fn push_segment(&self, _segment: &MediaSegment) -> Result<(), FallbackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(())
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn transient() -> FallbackError {
        FallbackError::WorkerFailure("connection refused".into())
    }

    fn fast_policy() -> UploadPolicy {
        UploadPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            failure_threshold: 2,
            cadence: Duration::from_millis(100),
            max_cadence: Duration::from_millis(400),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_segments_sent_on_healthy_sink() {
        let sink = ScriptedSink::new(vec![]);
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(4), sink.clone(), fast_policy());

        let report = uploader.run().await;
        assert_eq!(report.segments_sent, 4);
        assert_eq!(report.segments_lost, 0);
        assert_eq!(sink.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_then_succeeds() {
        let sink = ScriptedSink::new(vec![Err(transient()), Err(transient()), Ok(())]);
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(1), sink.clone(), fast_policy());

        let report = uploader.run().await;
        assert_eq!(report.segments_sent, 1);
        assert_eq!(report.segments_lost, 0);
        assert_eq!(sink.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_dropped_after_retry_budget() {
        let sink = ScriptedSink::new(vec![Err(transient()), Err(transient()), Err(transient())]);
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(2), sink.clone(), fast_policy());

        let report = uploader.run().await;
        assert_eq!(report.segments_sent, 1);
        assert_eq!(report.segments_lost, 1);
        // 3 attempts for the lost segment, 1 for the next.
        assert_eq!(sink.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let sink = ScriptedSink::new(vec![Err(FallbackError::InvalidSegmentFormat(
            "text/plain".into(),
        ))]);
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(1), sink.clone(), fast_policy());

        let report = uploader.run().await;
        assert_eq!(report.segments_lost, 1);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_400_is_not_retried() {
        // Whatever reason the endpoint gives, its 400 means this segment
        // is unacceptable as-is.
        let sink = ScriptedSink::new(vec![Err(FallbackError::UploadRejected(
            "Segment too small: 4 bytes (minimum 1024)".into(),
        ))]);
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(1), sink.clone(), fast_policy());

        let report = uploader.run().await;
        assert_eq!(report.segments_lost, 1);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_widens_under_sustained_failure_and_recovers() {
        // Two fully failed segments trip the threshold; the third succeeds.
        let mut outcomes = Vec::new();
        for _ in 0..6 {
            outcomes.push(Err(transient()));
        }
        outcomes.push(Ok(()));
        let sink = ScriptedSink::new(outcomes);

        let start = tokio::time::Instant::now();
        let uploader = SegmentUploader::with_policy(ScriptedFeed::of(3), sink.clone(), fast_policy());
        let report = uploader.run().await;

        assert_eq!(report.segments_sent, 1);
        assert_eq!(report.segments_lost, 2);

        // Sleeps: retries 2x(10+20)ms, cadence 100 + 200 (widened) + 100
        // (restored after success). Paused time makes this exact.
        let elapsed = start.elapsed();
        assert_eq!(elapsed, Duration::from_millis(460));
    }
}
