use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::types::{CandidateFile, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadStatus {
    /// Created, request not yet issued
    Idle,
    /// Request in flight
    Uploading,
    /// Endpoint confirmed the upload
    Completed,
    /// Request failed; terminal until the record is removed
    Error,
}

/// One file's upload attempt. File identity fields are immutable once the
/// record is created; only progress, status and the outcome fields move.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadRecord {
    pub id: RecordId,
    pub file_name: String,
    pub file_path: PathBuf,
    pub media_type: String,
    pub file_size: u64,
    pub status: UploadStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub remote_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UploadRecord {
    pub(crate) fn new(candidate: CandidateFile) -> Self {
        Self {
            id: RecordId::new(),
            file_name: candidate.file_name,
            file_path: candidate.path,
            media_type: candidate.media_type,
            file_size: candidate.file_size,
            status: UploadStatus::Idle,
            progress: 0,
            error: None,
            remote_url: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Completed and Error leave only through record removal.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, UploadStatus::Completed | UploadStatus::Error)
    }
}
