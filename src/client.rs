use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use url::Url;
use crate::config::UploaderConfig;
use crate::errors::{Result, UploadError};
use crate::progress::ProgressStream;
use crate::record::UploadRecord;
use crate::types::ProgressSender;

/// Response body of the upload endpoint. A 2xx status alone is not
/// success; the body must carry the flag.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    message: Option<String>,
    file_url: Option<String>,
}

/// The seam between the record state machine and the wire. One call issues
/// one request for one record and reports body progress through `progress`.
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    /// Returns the remote locator when the endpoint supplies one.
    async fn upload(&self, record: &UploadRecord, progress: ProgressSender) -> Result<Option<String>>;
}

/// Production transport: single-file multipart POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout_duration() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Endpoints may answer with a path-only locator; resolve it against
    /// the endpoint origin.
    fn resolve_url(&self, location: &str) -> String {
        if location.starts_with("http") {
            return location.to_string();
        }

        match Url::parse(&self.endpoint) {
            Ok(url) => format!("{}{}", url.origin().ascii_serialization(), location),
            Err(_) => location.to_string(),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload(&self, record: &UploadRecord, progress: ProgressSender) -> Result<Option<String>> {
        let file = File::open(&record.file_path).await?;
        let stream = ProgressStream::new(ReaderStream::new(file), progress, record.file_size);

        let part = Part::stream_with_length(Body::wrap_stream(stream), record.file_size)
            .file_name(record.file_name.clone())
            .mime_str(&record.media_type)?;
        let form = Form::new().part("file", part);

        let response = self.client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(
                status.as_u16(),
                format!("upload failed with status {}", status),
            ));
        }

        let raw = response.text().await?;
        let decoded: UploadResponse = serde_json::from_str(&raw)?;

        if !decoded.success {
            return Err(UploadError::Rejected(
                decoded.message.unwrap_or_else(|| "upload failed".to_string()),
            ));
        }

        Ok(decoded.file_url.map(|location| self.resolve_url(&location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> HttpTransport {
        let config = UploaderConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[test]
    fn decodes_success_body_with_camel_case_locator() {
        let decoded: UploadResponse =
            serde_json::from_str(r#"{"success":true,"fileUrl":"/files/a.pdf"}"#).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.file_url.as_deref(), Some("/files/a.pdf"));
        assert!(decoded.message.is_none());
    }

    #[test]
    fn decodes_failure_body_with_message() {
        let decoded: UploadResponse =
            serde_json::from_str(r#"{"success":false,"message":"quota exceeded"}"#).unwrap();
        assert!(!decoded.success);
        assert_eq!(decoded.message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(serde_json::from_str::<UploadResponse>("<html>oops</html>").is_err());
    }

    #[test]
    fn relative_locator_resolves_against_endpoint_origin() {
        let transport = transport("https://files.example.com/upload");
        assert_eq!(
            transport.resolve_url("/stored/a.pdf"),
            "https://files.example.com/stored/a.pdf"
        );
    }

    #[test]
    fn absolute_locator_passes_through() {
        let transport = transport("https://files.example.com/upload");
        assert_eq!(
            transport.resolve_url("https://cdn.example.com/a.pdf"),
            "https://cdn.example.com/a.pdf"
        );
    }
}
