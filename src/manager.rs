use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::client::{HttpTransport, UploadTransport};
use crate::config::UploaderConfig;
use crate::errors::{Result, UploadError};
use crate::record::UploadRecord;
use crate::types::{CandidateFile, ManagerCommand, RecordId, Submission, UploadEvent};
use crate::validate::Validator;
use crate::worker::ManagerWorker;

/// Public handle over the manager worker. Every method is a command sent
/// to the worker task; none blocks on network I/O. Uploads report back
/// asynchronously through the event channel.
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
    worker_handle: JoinHandle<()>,
}

impl UploadManager {
    /// Manager backed by the HTTP transport described by `config`.
    pub fn new(config: UploaderConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Manager over a caller-supplied transport.
    pub fn with_transport(config: UploaderConfig, transport: Arc<dyn UploadTransport>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let validator = Validator::new(&config);

        let worker_handle = tokio::spawn(ManagerWorker::run(
            transport,
            validator,
            command_rx,
            event_tx.clone(),
        ));

        Self {
            command_tx,
            event_tx,
            worker_handle,
        }
    }

    /// Notification sink: state changes, progress, success/failure,
    /// validation rejections.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    /// Validate a batch and start one upload per accepted file. Valid files
    /// proceed even when siblings are rejected.
    pub async fn submit(&self, candidates: Vec<CandidateFile>) -> Result<Submission> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Submit {
                candidates,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::internal("send command [Submit] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))
    }

    /// Cancel the in-flight request (when uploading) and delete the record.
    /// Cancellation is client-side only; bytes already sent may still be
    /// processed by the endpoint.
    pub async fn remove(&self, record_id: RecordId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Remove {
                record_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::internal("send command [Remove] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))?
    }

    /// Snapshot of one record.
    pub async fn record(&self, record_id: RecordId) -> Result<Option<UploadRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::GetRecord {
                record_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::internal("send command [GetRecord] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))
    }

    /// Snapshot of all records, in arrival order.
    pub async fn records(&self) -> Result<Vec<UploadRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::GetAllRecords { reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal("send command [GetAllRecords] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))
    }

    /// Mean completion percentage across all tracked records.
    pub async fn overall_progress(&self) -> Result<u8> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::OverallProgress { reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal("send command [OverallProgress] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))
    }

    /// Cancel everything in flight and join the worker.
    pub async fn shutdown(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal("send command [Shutdown] failed"))?;

        reply_rx
            .await
            .map_err(|_| UploadError::internal("manager worker dropped the reply"))?;

        self.worker_handle
            .await
            .map_err(|err| UploadError::Internal(format!("worker join failed: {}", err)))
    }
}
