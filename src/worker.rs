use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::client::UploadTransport;
use crate::errors::{Result, UploadError};
use crate::record::{UploadRecord, UploadStatus};
use crate::types::{
    CandidateFile, ManagerCommand, ProgressSender, ProgressSignal, RecordId, Submission,
    UploadEvent,
};
use crate::validate::Validator;

type Outcome = (RecordId, Result<Option<String>>);

/// Owns all mutable manager state on one task: the ordered record sequence
/// and the cancellation-token map. Every mutation happens inside one loop
/// step, which is what makes remove-record-and-handle atomic to observers.
pub(crate) struct ManagerWorker {
    transport: Arc<dyn UploadTransport>,
    validator: Validator,
    records: Vec<UploadRecord>,
    handles: HashMap<RecordId, CancellationToken>,

    event_tx: broadcast::Sender<UploadEvent>,
    progress_tx: mpsc::UnboundedSender<ProgressSignal>,
    completion_tx: mpsc::UnboundedSender<Outcome>,
}

impl ManagerWorker {
    pub(crate) async fn run(
        transport: Arc<dyn UploadTransport>,
        validator: Validator,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

        let mut worker = Self {
            transport,
            validator,
            records: Vec::new(),
            handles: HashMap::new(),
            event_tx,
            progress_tx,
            completion_tx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !worker.handle_command(command) {
                                break;
                            }
                        }
                        // every manager handle is gone
                        None => {
                            worker.cancel_all();
                            break;
                        }
                    }
                }
                Some(signal) = progress_rx.recv() => {
                    worker.handle_progress(signal);
                }
                Some((record_id, outcome)) = completion_rx.recv() => {
                    worker.handle_completion(record_id, outcome);
                }
            }
        }

        debug!("manager worker stopped");
    }

    /// Returns false when the worker should stop.
    fn handle_command(&mut self, command: ManagerCommand) -> bool {
        match command {
            ManagerCommand::Submit { candidates, reply } => {
                let submission = self.submit(candidates);
                let _ = reply.send(submission);
            }
            ManagerCommand::Remove { record_id, reply } => {
                let _ = reply.send(self.remove(record_id));
            }
            ManagerCommand::GetRecord { record_id, reply } => {
                let _ = reply.send(self.find(record_id).cloned());
            }
            ManagerCommand::GetAllRecords { reply } => {
                let _ = reply.send(self.records.clone());
            }
            ManagerCommand::OverallProgress { reply } => {
                let _ = reply.send(self.overall_progress());
            }
            ManagerCommand::Shutdown { reply } => {
                self.cancel_all();
                let _ = reply.send(());
                return false;
            }
        }

        true
    }

    fn submit(&mut self, candidates: Vec<CandidateFile>) -> Submission {
        let (accepted, rejected) = self.validator.partition(candidates);

        if !rejected.is_empty() {
            warn!(count = rejected.len(), "rejected files at validation");
            let _ = self.event_tx.send(UploadEvent::FilesRejected {
                rejections: rejected.clone(),
            });
        }

        let mut ids = Vec::with_capacity(accepted.len());
        for candidate in accepted {
            let record = UploadRecord::new(candidate);
            let record_id = record.id;
            debug!(record_id = %record_id, file = %record.file_name, "record created");
            self.records.push(record);
            ids.push(record_id);
            self.start_upload(record_id);
        }

        Submission {
            accepted: ids,
            rejected,
        }
    }

    /// Idle -> Uploading: register the token and spawn the request, racing
    /// it against cancellation.
    fn start_upload(&mut self, record_id: RecordId) {
        let Some(record) = self.find_mut(record_id) else {
            return;
        };

        record.status = UploadStatus::Uploading;
        record.progress = 0;
        record.started_at = Some(chrono::Utc::now());
        let snapshot = record.clone();

        let token = CancellationToken::new();
        self.handles.insert(record_id, token.clone());
        self.emit_state_change(record_id, UploadStatus::Idle, UploadStatus::Uploading);

        let transport = self.transport.clone();
        let progress = ProgressSender::new(record_id, self.progress_tx.clone());
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                result = transport.upload(&snapshot, progress) => result,
                _ = token.cancelled() => Err(UploadError::Cancelled),
            };

            let _ = completion_tx.send((record_id, outcome));
        });
    }

    /// Uploading self-loop. Signals resolve their record by identity; a
    /// removed identity is a silent no-op. Capped at 99 because 100 is
    /// written by the completion transition only.
    fn handle_progress(&mut self, signal: ProgressSignal) {
        let percent = percent_of(signal.bytes_sent, signal.bytes_total).min(99);

        let Some(record) = self.find_mut(signal.record_id) else {
            debug!(record_id = %signal.record_id, "progress signal for removed record dropped");
            return;
        };
        if record.status != UploadStatus::Uploading || percent <= record.progress {
            return;
        }
        record.progress = percent;

        let _ = self.event_tx.send(UploadEvent::Progress {
            record_id: signal.record_id,
            progress: percent,
        });
    }

    fn handle_completion(&mut self, record_id: RecordId, outcome: Result<Option<String>>) {
        // the token is spent whichever way the race went
        self.handles.remove(&record_id);

        // cancellation is not an error and emits nothing; in the removal
        // path the record is already gone by the time this arrives
        if matches!(outcome, Err(UploadError::Cancelled)) {
            debug!(record_id = %record_id, "upload cancelled");
            return;
        }

        let Some(record) = self.find_mut(record_id) else {
            debug!(record_id = %record_id, "completion for removed record dropped");
            return;
        };

        match outcome {
            Ok(remote_url) => {
                record.status = UploadStatus::Completed;
                record.progress = 100;
                record.error = None;
                record.remote_url = remote_url.clone();
                record.completed_at = Some(chrono::Utc::now());
                let file_name = record.file_name.clone();

                debug!(record_id = %record_id, file = %file_name, "upload completed");
                self.emit_state_change(record_id, UploadStatus::Uploading, UploadStatus::Completed);
                let _ = self.event_tx.send(UploadEvent::Succeeded {
                    record_id,
                    file_name,
                    remote_url,
                });
            }
            Err(err) => {
                let reason = err.to_string();
                record.status = UploadStatus::Error;
                record.progress = 0;
                record.error = Some(reason.clone());
                let file_name = record.file_name.clone();

                warn!(record_id = %record_id, file = %file_name, error = %reason, "upload failed");
                self.emit_state_change(record_id, UploadStatus::Uploading, UploadStatus::Error);
                let _ = self.event_tx.send(UploadEvent::Failed {
                    record_id,
                    file_name,
                    reason,
                });
            }
        }
    }

    /// Cancel the in-flight request if any, then drop handle and record in
    /// the same step. Late signals for this identity find nothing.
    fn remove(&mut self, record_id: RecordId) -> Result<()> {
        let index = self.records
            .iter()
            .position(|record| record.id == record_id)
            .ok_or(UploadError::RecordNotFound)?;

        if let Some(token) = self.handles.remove(&record_id) {
            token.cancel();
        }
        let record = self.records.remove(index);
        debug!(record_id = %record_id, file = %record.file_name, "record removed");

        Ok(())
    }

    /// Mean of the per-record percentages, derived on demand.
    fn overall_progress(&self) -> u8 {
        if self.records.is_empty() {
            return 0;
        }

        let total: u64 = self.records.iter().map(|record| record.progress as u64).sum();
        (total as f64 / self.records.len() as f64).round() as u8
    }

    fn cancel_all(&mut self) {
        for (_, token) in self.handles.drain() {
            token.cancel();
        }
    }

    fn find(&self, record_id: RecordId) -> Option<&UploadRecord> {
        self.records.iter().find(|record| record.id == record_id)
    }

    fn find_mut(&mut self, record_id: RecordId) -> Option<&mut UploadRecord> {
        self.records.iter_mut().find(|record| record.id == record_id)
    }

    fn emit_state_change(&self, record_id: RecordId, old_state: UploadStatus, new_state: UploadStatus) {
        let _ = self.event_tx.send(UploadEvent::StateChanged {
            record_id,
            old_state,
            new_state,
        });
    }
}

fn percent_of(bytes_sent: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        return 0;
    }

    (bytes_sent as f64 / bytes_total as f64 * 100.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent_of(0, 200), 0);
        assert_eq!(percent_of(1, 200), 1);   // 0.5 rounds up
        assert_eq!(percent_of(99, 200), 50); // 49.5 rounds up
        assert_eq!(percent_of(200, 200), 100);
    }

    #[test]
    fn percent_handles_empty_and_overshooting_bodies() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(10, 0), 0);
        assert_eq!(percent_of(300, 200), 100);
    }
}
