use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Upload rejected by endpoint: {0}")]
    Rejected(String),

    #[error("Malformed response body: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Record not found")]
    RecordNotFound,

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
