//! Per-session transcode worker
//!
//! Server-side variant of the fallback pipeline: instead of publishing
//! uploaded segments directly, each session gets an ffmpeg child process
//! that consumes raw uploaded media on stdin and emits a DASH manifest
//! plus segments into the session's media directory. The manifest file is
//! ffmpeg's to write; we poll (bounded) for it to appear before telling
//! the consuming peer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::protocol::{constants, SessionId};

use super::error::FallbackError;

/// Transcoder process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Transcoder binary.
    pub command: String,
    /// Arguments; the literal `{manifest}` expands to the output
    /// manifest's absolute path.
    pub args: Vec<String>,
    /// Manifest file name within the session directory.
    pub manifest_name: String,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            args: vec![
                "-hide_banner".into(),
                "-loglevel".into(),
                "error".into(),
                "-i".into(),
                "pipe:0".into(),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                "copy".into(),
                "-f".into(),
                "dash".into(),
                "-seg_duration".into(),
                constants::TARGET_DURATION_SECS.to_string(),
                "-window_size".into(),
                constants::ROLLING_WINDOW_SIZE.to_string(),
                "-remove_at_exit".into(),
                "1".into(),
                "{manifest}".into(),
            ],
            manifest_name: "stream.mpd".to_string(),
            poll_interval: constants::MANIFEST_POLL_INTERVAL,
            poll_attempts: constants::MANIFEST_POLL_ATTEMPTS,
        }
    }
}

/// One running transcoder child bound to one session.
#[derive(Debug)]
pub struct TranscodeWorker {
    session_id: SessionId,
    dir: PathBuf,
    manifest_path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    config: WorkerConfig,
}

impl TranscodeWorker {
    /// Spawn the transcoder for `session_id` under `media_root`.
    pub async fn spawn(
        session_id: SessionId,
        media_root: &std::path::Path,
        config: WorkerConfig,
    ) -> Result<Self, FallbackError> {
        let dir = media_root.join(session_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let manifest_path = dir.join(&config.manifest_name);

        let args: Vec<String> = config
            .args
            .iter()
            .map(|a| a.replace("{manifest}", &manifest_path.to_string_lossy()))
            .collect();

        let mut child = Command::new(&config.command)
            .args(&args)
            .current_dir(&dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FallbackError::WorkerFailure(format!(
                    "failed to spawn {}: {}",
                    config.command, e
                ))
            })?;

        let stdin = child.stdin.take();
        tracing::info!(session_id = %session_id, command = %config.command, "Transcode worker started");

        Ok(Self {
            session_id,
            dir,
            manifest_path,
            child,
            stdin,
            config,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Manifest path relative to the media root's mount point.
    pub fn manifest_url_path(&self) -> String {
        format!("media/{}/{}", self.session_id, self.config.manifest_name)
    }

    /// Stream one uploaded chunk into the transcoder's stdin.
    pub async fn feed(&mut self, data: &[u8]) -> Result<(), FallbackError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            FallbackError::WorkerFailure("transcoder stdin already closed".into())
        })?;
        stdin.write_all(data).await.map_err(|e| {
            FallbackError::WorkerFailure(format!("transcoder stdin write failed: {}", e))
        })?;
        stdin.flush().await.map_err(|e| {
            FallbackError::WorkerFailure(format!("transcoder stdin flush failed: {}", e))
        })
    }

    /// Wait (bounded) for the transcoder to write its first manifest.
    /// Returns the manifest's relative URL path.
    pub async fn wait_for_manifest(&mut self) -> Result<String, FallbackError> {
        for _ in 0..self.config.poll_attempts {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(FallbackError::WorkerFailure(format!(
                    "transcoder exited early with {}",
                    status
                )));
            }
            if tokio::fs::try_exists(&self.manifest_path)
                .await
                .unwrap_or(false)
            {
                tracing::debug!(session_id = %self.session_id, "Manifest available");
                return Ok(self.manifest_url_path());
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(FallbackError::ManifestUnavailable {
            attempts: self.config.poll_attempts,
        })
    }

    /// Close stdin, kill the child and delete the session's media
    /// directory. Idempotent.
    pub async fn shutdown(mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.ok();
        }
        if let Err(e) = self.child.kill().await {
            tracing::debug!(session_id = %self.session_id, error = %e, "Transcoder already gone");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to remove media directory");
            }
        }
        tracing::info!(session_id = %self.session_id, "Transcode worker stopped");
    }
}
