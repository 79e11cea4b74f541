use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use crate::client::UploadTransport;
use crate::config::UploaderConfig;
use crate::errors::{Result, UploadError};
use crate::manager::UploadManager;
use crate::record::{UploadRecord, UploadStatus};
use crate::types::{CandidateFile, ProgressSender, RecordId, RejectReason, UploadEvent};

const MB: u64 = 1024 * 1024;

/// Scripted transport, keyed by file name.
#[derive(Clone)]
enum Script {
    /// Four progress steps, then a confirmed upload
    Succeed { remote_url: Option<String> },
    /// Half the body, then a non-2xx response
    ServerError(u16),
    /// 2xx carrying success=false
    Reject(String),
    /// Parks at 40% until cancelled
    Hang,
}

struct MockTransport {
    scripts: HashMap<String, Script>,
}

impl MockTransport {
    fn new(scripts: impl IntoIterator<Item = (&'static str, Script)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .into_iter()
                .map(|(name, script)| (name.to_string(), script))
                .collect(),
        })
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn upload(&self, record: &UploadRecord, progress: ProgressSender) -> Result<Option<String>> {
        let script = self.scripts
            .get(&record.file_name)
            .cloned()
            .unwrap_or(Script::Succeed { remote_url: None });

        match script {
            Script::Succeed { remote_url } => {
                for step in 1..=4u64 {
                    sleep(Duration::from_millis(5)).await;
                    progress.send(record.file_size * step / 4, record.file_size);
                }
                Ok(remote_url)
            }
            Script::ServerError(status) => {
                sleep(Duration::from_millis(5)).await;
                progress.send(record.file_size / 2, record.file_size);
                Err(UploadError::server_error(status, format!("upload failed with status {}", status)))
            }
            Script::Reject(message) => {
                sleep(Duration::from_millis(5)).await;
                Err(UploadError::Rejected(message))
            }
            Script::Hang => {
                progress.send(record.file_size * 2 / 5, record.file_size);
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn manager_with(transport: Arc<MockTransport>) -> UploadManager {
    UploadManager::with_transport(UploaderConfig::default(), transport)
}

fn pdf(name: &str, size: u64) -> CandidateFile {
    CandidateFile::new(name, "application/pdf", size).unwrap()
}

async fn wait_for_settled(manager: &UploadManager, record_id: RecordId) -> UploadRecord {
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(record) = manager.record(record_id).await.unwrap() {
                if record.is_settled() {
                    return record;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("record did not settle in time")
}

async fn wait_for_progress(manager: &UploadManager, record_id: RecordId, progress: u8) {
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(record) = manager.record(record_id).await.unwrap() {
                if record.progress >= progress {
                    return;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("record never reached the expected progress")
}

async fn collect_events(rx: &mut broadcast::Receiver<UploadEvent>, window: Duration) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => events.push(event),
            _ => break,
        }
    }

    events
}

#[tokio::test]
async fn accepted_file_uploads_to_completion() {
    let transport = MockTransport::new([(
        "report.pdf",
        Script::Succeed { remote_url: Some("https://files.example.com/stored/report.pdf".to_string()) },
    )]);
    let manager = manager_with(transport);
    let mut events = manager.subscribe();

    let submission = manager.submit(vec![pdf("report.pdf", 5 * MB)]).await.unwrap();
    assert_eq!(submission.accepted.len(), 1);
    assert!(submission.rejected.is_empty());

    let record_id = submission.accepted[0];
    let record = wait_for_settled(&manager, record_id).await;
    assert_eq!(record.status, UploadStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.remote_url.as_deref(), Some("https://files.example.com/stored/report.pdf"));
    assert!(record.error.is_none());
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    let events = collect_events(&mut events, Duration::from_millis(100)).await;

    // created Idle, immediately driven to Uploading
    assert!(events.iter().any(|event| matches!(
        event,
        UploadEvent::StateChanged {
            old_state: UploadStatus::Idle,
            new_state: UploadStatus::Uploading,
            ..
        }
    )));

    // progress strictly rises and never reports 100 before completion
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            UploadEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(progress.iter().all(|percent| *percent < 100));

    assert!(events.iter().any(|event| matches!(
        event,
        UploadEvent::Succeeded { file_name, .. } if file_name == "report.pdf"
    )));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_files_produce_no_record_and_one_batch_event() {
    let transport = MockTransport::new([]);
    let manager = manager_with(transport);
    let mut events = manager.subscribe();

    let submission = manager
        .submit(vec![
            pdf("ok.pdf", MB),
            pdf("huge.pdf", 15 * MB),
            CandidateFile::new("photo.png", "image/png", MB).unwrap(),
        ])
        .await
        .unwrap();

    assert_eq!(submission.accepted.len(), 1);
    assert_eq!(submission.rejected.len(), 2);
    assert!(matches!(submission.rejected[0].reason, RejectReason::TooLarge { .. }));
    assert!(matches!(submission.rejected[1].reason, RejectReason::UnsupportedType { .. }));

    // the valid sibling is unaffected by the rejections
    let record = wait_for_settled(&manager, submission.accepted[0]).await;
    assert_eq!(record.status, UploadStatus::Completed);

    let records = manager.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_name, "ok.pdf");

    let events = collect_events(&mut events, Duration::from_millis(100)).await;
    let rejection_batches: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            UploadEvent::FilesRejected { rejections } => Some(rejections),
            _ => None,
        })
        .collect();
    assert_eq!(rejection_batches.len(), 1);
    assert_eq!(rejection_batches[0].len(), 2);
    assert_eq!(rejection_batches[0][0].file_name, "huge.pdf");
    assert_eq!(rejection_batches[0][1].file_name, "photo.png");

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_error_marks_only_that_record() {
    let transport = MockTransport::new([
        ("bad.pdf", Script::ServerError(500)),
        ("good.pdf", Script::Succeed { remote_url: None }),
    ]);
    let manager = manager_with(transport);

    let submission = manager
        .submit(vec![pdf("bad.pdf", 2 * MB), pdf("good.pdf", 2 * MB)])
        .await
        .unwrap();

    let bad = wait_for_settled(&manager, submission.accepted[0]).await;
    assert_eq!(bad.status, UploadStatus::Error);
    assert_eq!(bad.progress, 0);
    assert!(bad.error.as_deref().unwrap().contains("500"));
    assert!(bad.remote_url.is_none());

    let good = wait_for_settled(&manager, submission.accepted[1]).await;
    assert_eq!(good.status, UploadStatus::Completed);
    assert_eq!(good.progress, 100);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn failure_flag_in_success_response_is_an_error() {
    let transport = MockTransport::new([
        ("flagged.pdf", Script::Reject("quota exceeded".to_string())),
    ]);
    let manager = manager_with(transport);

    let submission = manager.submit(vec![pdf("flagged.pdf", MB)]).await.unwrap();
    let record = wait_for_settled(&manager, submission.accepted[0]).await;

    assert_eq!(record.status, UploadStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("quota exceeded"));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancel_mid_transfer_removes_record_without_failure_event() {
    let transport = MockTransport::new([
        ("stuck.pdf", Script::Hang),
        ("ok.pdf", Script::Succeed { remote_url: None }),
    ]);
    let manager = manager_with(transport);
    let mut events = manager.subscribe();

    let submission = manager
        .submit(vec![pdf("stuck.pdf", 5 * MB), pdf("ok.pdf", 5 * MB)])
        .await
        .unwrap();
    let stuck_id = submission.accepted[0];
    let ok_id = submission.accepted[1];

    wait_for_progress(&manager, stuck_id, 40).await;
    manager.remove(stuck_id).await.unwrap();

    // record and handle go together; only the sibling remains
    assert!(manager.record(stuck_id).await.unwrap().is_none());
    let records = manager.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, ok_id);

    wait_for_settled(&manager, ok_id).await;

    // aggregate now covers the remaining record only
    assert_eq!(manager.overall_progress().await.unwrap(), 100);

    // no failure notification and no late signal for the removed identity;
    // the single 40% progress event from before the removal is fine
    let events = collect_events(&mut events, Duration::from_millis(150)).await;
    assert!(!events.iter().any(|event| matches!(event, UploadEvent::Failed { .. })));
    let stuck_progress = events
        .iter()
        .filter(|event| matches!(
            event,
            UploadEvent::Progress { record_id, .. } if *record_id == stuck_id
        ))
        .count();
    assert!(stuck_progress <= 1);
    assert!(!events.iter().any(|event| match event {
        UploadEvent::StateChanged { record_id, new_state, .. } => {
            *record_id == stuck_id && *new_state != UploadStatus::Uploading
        }
        UploadEvent::Succeeded { record_id, .. } => *record_id == stuck_id,
        _ => false,
    }));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn overall_progress_is_the_mean_of_record_progress() {
    let transport = MockTransport::new([
        ("stuck.pdf", Script::Hang),
        ("done.pdf", Script::Succeed { remote_url: None }),
    ]);
    let manager = manager_with(transport);

    assert_eq!(manager.overall_progress().await.unwrap(), 0);

    let submission = manager
        .submit(vec![pdf("stuck.pdf", 5 * MB), pdf("done.pdf", 5 * MB)])
        .await
        .unwrap();

    wait_for_progress(&manager, submission.accepted[0], 40).await;
    wait_for_settled(&manager, submission.accepted[1]).await;

    // (40 + 100) / 2
    assert_eq!(manager.overall_progress().await.unwrap(), 70);

    manager.remove(submission.accepted[0]).await.unwrap();
    assert_eq!(manager.overall_progress().await.unwrap(), 100);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn removing_unknown_record_is_an_error() {
    let manager = manager_with(MockTransport::new([]));

    let result = manager.remove(RecordId::new()).await;
    assert!(matches!(result, Err(UploadError::RecordNotFound)));

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn error_records_keep_their_stored_progress_in_the_aggregate() {
    let transport = MockTransport::new([
        ("bad.pdf", Script::ServerError(502)),
        ("good.pdf", Script::Succeed { remote_url: None }),
    ]);
    let manager = manager_with(transport);

    let submission = manager
        .submit(vec![pdf("bad.pdf", 2 * MB), pdf("good.pdf", 2 * MB)])
        .await
        .unwrap();

    wait_for_settled(&manager, submission.accepted[0]).await;
    wait_for_settled(&manager, submission.accepted[1]).await;

    // error resets to 0, completed holds 100
    assert_eq!(manager.overall_progress().await.unwrap(), 50);

    manager.shutdown().await.unwrap();
}
