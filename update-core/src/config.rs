/// Update configuration structures that can be tested independently
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One hour, the default gap between release checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_600_000;
/// Read size for the firmware stream. Small on purpose: the heap is tight
/// while WiFi and TLS buffers are live.
pub const DEFAULT_CHUNK_SIZE: usize = 128;
/// Upper bound for a release manifest body. A GitHub release document with
/// author objects and a few pages of notes runs to several KiB.
pub const DEFAULT_MAX_MANIFEST_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadPolicy {
    pub chunk_size: usize,
    /// Delay between polls while the stream has no data available.
    pub poll_delay_ms: u32,
    /// Give up when no byte arrives for this long.
    pub stall_timeout_ms: u64,
    /// Give up when a single transfer runs longer than this.
    pub session_timeout_ms: u64,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_delay_ms: 1,
            stall_timeout_ms: 30_000,
            session_timeout_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub manifest_url: String,
    pub poll_interval_ms: u64,
    pub max_manifest_bytes: usize,
    pub download: DownloadPolicy,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest_url: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
            download: DownloadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("manifest URL is empty")]
    MissingManifestUrl,
    #[error("poll interval must be non-zero")]
    ZeroInterval,
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("manifest size limit must be non-zero")]
    ZeroManifestLimit,
}

impl UpdateConfig {
    pub fn with_manifest_url(url: impl Into<String>) -> Self {
        Self {
            manifest_url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest_url.trim().is_empty() {
            return Err(ConfigError::MissingManifestUrl);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.download.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.max_manifest_bytes == 0 {
            return Err(ConfigError::ZeroManifestLimit);
        }
        Ok(())
    }
}
