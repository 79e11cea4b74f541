pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod progress;
pub mod record;
pub mod types;
pub mod validate;
mod worker;

pub use client::{HttpTransport, UploadTransport};
pub use config::UploaderConfig;
pub use errors::{Result, UploadError};
pub use manager::UploadManager;
pub use record::{UploadRecord, UploadStatus};
pub use types::{
    CandidateFile,
    ProgressSender,
    RecordId,
    Rejection,
    RejectReason,
    Submission,
    UploadEvent,
};
pub use validate::Validator;

#[cfg(test)]
mod tests;
