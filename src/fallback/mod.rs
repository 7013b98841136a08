//! Server-relayed media fallback
//!
//! When direct peer connectivity fails, the sending side slices its feed
//! into media segments and uploads them to the relay over HTTP; the relay
//! persists them, maintains a rolling manifest per session and serves
//! everything as static files; the receiving side polls for the manifest
//! and plays it. Two server-side variants exist: direct segment
//! publication ([`store::SegmentStore`]) and transcoding through a
//! per-session ffmpeg child ([`worker::TranscodeWorker`]).

pub mod consumer;
pub mod error;
pub mod manifest;
pub mod store;
pub mod uploader;
pub mod worker;

pub use consumer::{HttpManifestFetcher, ManifestConsumer, ManifestFetcher};
pub use error::FallbackError;
pub use manifest::{Manifest, SegmentRef};
pub use store::{AcceptedSegment, SegmentStore};
pub use uploader::{
    HttpSegmentSink, MediaFeed, MediaSegment, SegmentSink, SegmentUploader, UploadPolicy,
    UploadReport,
};
pub use worker::{TranscodeWorker, WorkerConfig};
