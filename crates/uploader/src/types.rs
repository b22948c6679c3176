//! Data types for the upload pipeline.

use std::path::PathBuf;
use std::time::Duration;

use capystore_transfer::{ProgressState, SizeLimits, UploadResult};
use serde::{Deserialize, Serialize};

/// Tunables for one upload pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    /// Retries per chunk after the first attempt.
    pub max_retries: u32,
    /// Delay between attempts of the same chunk.
    pub retry_delay: Duration,
    /// Maximum number of chunks in flight at once.
    pub concurrency: usize,
    /// Transport timeout applied to every request.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// Total time allowed for the finalize job before giving up.
    pub max_poll_duration: Duration,
    /// Consecutive failed status requests tolerated while polling.
    pub max_poll_errors: u32,
    /// How often the progress ticker samples the estimator.
    pub progress_interval: Duration,
    /// Duration over which the progress bar ramps from 90% to 99%.
    pub finalize_window: Duration,
    pub limits: SizeLimits,
    /// Where directory archives are written while they upload.
    pub scratch_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            concurrency: 4,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_poll_duration: Duration::from_secs(300),
            max_poll_errors: 5,
            progress_interval: Duration::from_millis(200),
            finalize_window: Duration::from_secs(60),
            limits: SizeLimits::default(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Coarse stage of a pipeline run, reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Packaging,
    SessionInit,
    ChunkUpload,
    Completing,
    Polling,
    Done,
    Failed,
    TimedOut,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }

    /// Human-readable label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "Checking sizes",
            Self::Packaging => "Packaging directory",
            Self::SessionInit => "Opening session",
            Self::ChunkUpload => "Uploading chunks",
            Self::Completing => "Finalizing",
            Self::Polling => "Waiting for storage",
            Self::Done => "Done",
            Self::Failed => "Failed",
            Self::TimedOut => "Timed out",
        }
    }
}

/// Event emitted while an upload runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The pipeline entered a new stage.
    Stage(PipelineStage),
    /// Estimated progress sample.
    Progress(ProgressState),
    /// The upload finished and the service returned a content hash.
    Completed {
        result: UploadResult,
        elapsed: Duration,
    },
    /// The upload failed; `error` is the user-facing message.
    Failed { error: String, elapsed: Duration },
}

/// What is actually sent: the original file or a temporary archive.
#[derive(Debug, Clone)]
pub struct Payload {
    pub path: PathBuf,
    /// Name reported to the service.
    pub name: String,
    pub size: u64,
    pub digest: String,
    pub is_directory: bool,
}

/// Completed upload, as handed to a [`HistoryRecorder`](crate::HistoryRecorder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub name: String,
    pub source_path: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    pub is_directory: bool,
    /// Bytes sent over the wire (archive size for directories).
    pub size: u64,
    pub file_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = UploadConfig::default();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.poll_interval, Duration::from_secs(2));
        assert_eq!(c.max_poll_duration, Duration::from_secs(300));
        assert_eq!(c.limits, SizeLimits::default());
    }

    #[test]
    fn terminal_stages() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Failed.is_terminal());
        assert!(PipelineStage::TimedOut.is_terminal());
        assert!(!PipelineStage::Polling.is_terminal());
    }

    #[test]
    fn history_record_json() {
        let rec = HistoryRecord {
            name: "site".into(),
            source_path: "/tmp/site".into(),
            content_hash: "bafy".into(),
            short_url: None,
            is_directory: true,
            size: 10,
            file_count: 2,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("short_url"));
        let back: HistoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
