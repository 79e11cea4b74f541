use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use crate::errors::{Result, UploadError};

/// 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_ACCEPTED_TYPES: &[&str] = &["application/pdf"];

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/upload";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Upload endpoint receiving one multipart POST per file
    pub endpoint: String,

    /// Media type allow-list
    pub accepted_types: Vec<String>,

    /// Largest accepted file, in bytes
    pub max_file_size: u64,

    /// HTTP timeout in seconds. None leaves a hung request Uploading
    /// until the user removes it.
    pub timeout: Option<u64>,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            accepted_types: DEFAULT_ACCEPTED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            timeout: None,
            event_capacity: 256,
        }
    }
}

impl UploaderConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| UploadError::Internal(format!("invalid config: {}", err)))
    }

    pub(crate) fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
