//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/capystore/config.toml`
//! - Windows: `%APPDATA%/capystore/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use capystore_uploader::{SizeLimits, UploadConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the storage API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Opaque user id sent with every request. Generated on first run.
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub upload: UploadSettings,

    #[serde(default)]
    pub limits: LimitSettings,
}

/// `[upload]` section. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub concurrency: usize,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_duration_ms: u64,
    pub max_poll_errors: u32,
    pub progress_interval_ms: u64,
    /// Directory for temporary archives. Defaults to the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

/// `[limits]` section, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl Default for UploadSettings {
    fn default() -> Self {
        let d = UploadConfig::default();
        Self {
            max_retries: d.max_retries,
            retry_delay_ms: millis(d.retry_delay),
            concurrency: d.concurrency,
            request_timeout_ms: millis(d.request_timeout),
            poll_interval_ms: millis(d.poll_interval),
            max_poll_duration_ms: millis(d.max_poll_duration),
            max_poll_errors: d.max_poll_errors,
            progress_interval_ms: millis(d.progress_interval),
            scratch_dir: None,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        let d = SizeLimits::default();
        Self {
            max_file_bytes: d.max_file_bytes,
            max_total_bytes: d.max_total_bytes,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            uid: String::new(),
            upload: UploadSettings::default(),
            limits: LimitSettings::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path`, or creates a default if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: CliConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (holds the user id).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Generates a uid if none is set. Returns `true` if one was generated.
    pub fn ensure_uid(&mut self) -> bool {
        if !self.uid.trim().is_empty() {
            return false;
        }
        self.uid = uuid::Uuid::new_v4().to_string();
        true
    }

    /// Builds the pipeline configuration.
    pub fn upload_config(&self) -> UploadConfig {
        let u = &self.upload;
        UploadConfig {
            max_retries: u.max_retries,
            retry_delay: Duration::from_millis(u.retry_delay_ms),
            concurrency: u.concurrency.max(1),
            request_timeout: Duration::from_millis(u.request_timeout_ms),
            poll_interval: Duration::from_millis(u.poll_interval_ms),
            max_poll_duration: Duration::from_millis(u.max_poll_duration_ms),
            max_poll_errors: u.max_poll_errors,
            progress_interval: Duration::from_millis(u.progress_interval_ms),
            limits: SizeLimits {
                max_file_bytes: self.limits.max_file_bytes,
                max_total_bytes: self.limits.max_total_bytes,
            },
            scratch_dir: u.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
            ..UploadConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("capystore")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("capystore").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/capystore/config.toml"))
    }
}

/// History file kept next to the configuration file.
pub fn history_path(config_path: &Path) -> PathBuf {
    config_path.with_file_name("history.jsonl")
}
