use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use crate::errors::{Result, UploadError};
use crate::record::{UploadRecord, UploadStatus};

/// Stable identity of one upload record. Asynchronous callbacks resolve
/// their target by this id, never by position in the record sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file offered to the manager, before validation.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub file_size: u64,
}

impl CandidateFile {
    /// Candidate with an explicitly declared media type and size.
    pub fn new(path: impl Into<PathBuf>, media_type: impl Into<String>, file_size: u64) -> Result<Self> {
        let path = path.into();
        let file_name = file_name_of(&path)?;

        Ok(Self {
            path,
            file_name,
            media_type: media_type.into(),
            file_size,
        })
    }

    /// Candidate built from a file on disk: size from metadata, media type
    /// guessed from the extension.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidFile(format!("{} is not a regular file", path.display())));
        }

        let file_name = file_name_of(&path)?;
        let media_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path,
            file_name,
            media_type,
            file_size: metadata.len(),
        })
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    let file_name = path.file_name()
        .ok_or_else(|| UploadError::InvalidFile(format!("{} has no file name", path.display())))?
        .to_str()
        .ok_or_else(|| UploadError::InvalidFile(format!("{} has a non-UTF-8 file name", path.display())))?;

    Ok(file_name.to_string())
}

/// Why the validator turned a candidate away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedType {
        media_type: String,
    },
    TooLarge {
        file_size: u64,
        limit: u64,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnsupportedType { media_type } => {
                write!(f, "unsupported media type: {}", media_type)
            }
            RejectReason::TooLarge { file_size, limit } => {
                write!(f, "file size {} exceeds the {} byte limit", file_size, limit)
            }
        }
    }
}

/// One rejected candidate, reported without aborting the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub reason: RejectReason,
}

/// Reply of a submit call: records created for accepted candidates,
/// per-file reasons for the rest.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub accepted: Vec<RecordId>,
    pub rejected: Vec<Rejection>,
}

/// Byte count reported by an in-flight request body.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSignal {
    pub record_id: RecordId,
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

/// Progress reporting endpoint handed to a transport for one request.
/// Sends are fire-and-forget; a closed worker simply drops them.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    record_id: RecordId,
    tx: mpsc::UnboundedSender<ProgressSignal>,
}

impl ProgressSender {
    pub(crate) fn new(record_id: RecordId, tx: mpsc::UnboundedSender<ProgressSignal>) -> Self {
        Self { record_id, tx }
    }

    pub fn send(&self, bytes_sent: u64, bytes_total: u64) {
        let _ = self.tx.send(ProgressSignal {
            record_id: self.record_id,
            bytes_sent,
            bytes_total,
        });
    }
}

/// Upload manager commands
pub enum ManagerCommand {
    /// Validate a batch and start an upload per accepted file
    Submit {
        candidates: Vec<CandidateFile>,
        reply: oneshot::Sender<Submission>,
    },

    /// Cancel (when in flight) and delete one record
    Remove {
        record_id: RecordId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Snapshot of one record
    GetRecord {
        record_id: RecordId,
        reply: oneshot::Sender<Option<UploadRecord>>,
    },

    /// Snapshot of all records, in arrival order
    GetAllRecords {
        reply: oneshot::Sender<Vec<UploadRecord>>,
    },

    /// Mean progress over all records
    OverallProgress {
        reply: oneshot::Sender<u8>,
    },

    /// Cancel everything in flight and stop the worker
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Record state transition
    StateChanged {
        record_id: RecordId,
        old_state: UploadStatus,
        new_state: UploadStatus,
    },

    /// Per-record progress update, percent in [0, 100]
    Progress {
        record_id: RecordId,
        progress: u8,
    },

    /// Endpoint confirmed the upload
    Succeeded {
        record_id: RecordId,
        file_name: String,
        remote_url: Option<String>,
    },

    /// Upload ended in error; never emitted for cancellations
    Failed {
        record_id: RecordId,
        file_name: String,
        reason: String,
    },

    /// Validation rejections of one submitted batch
    FilesRejected {
        rejections: Vec<Rejection>,
    },
}
