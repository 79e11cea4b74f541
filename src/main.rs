use std::collections::HashSet;
use courier::{CandidateFile, UploadEvent, UploadManager, UploaderConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = UploaderConfig::from_file("config.toml").unwrap_or_default();

    let mut candidates = Vec::new();
    for arg in std::env::args().skip(1) {
        candidates.push(CandidateFile::from_path(arg).await?);
    }
    if candidates.is_empty() {
        anyhow::bail!("usage: courier <file>...");
    }

    let manager = UploadManager::new(config)?;
    let mut events = manager.subscribe();

    let submission = manager.submit(candidates).await?;
    for rejection in &submission.rejected {
        eprintln!("rejected {}: {}", rejection.file_name, rejection.reason);
    }

    let mut pending: HashSet<_> = submission.accepted.iter().copied().collect();
    while !pending.is_empty() {
        match events.recv().await? {
            UploadEvent::Progress { record_id, progress } => {
                println!("{}: {}%", record_id, progress);
            }
            UploadEvent::Succeeded { record_id, file_name, remote_url } => {
                pending.remove(&record_id);
                match remote_url {
                    Some(url) => println!("{} uploaded to {}", file_name, url),
                    None => println!("{} uploaded", file_name),
                }
            }
            UploadEvent::Failed { record_id, file_name, reason } => {
                pending.remove(&record_id);
                eprintln!("{} failed: {}", file_name, reason);
            }
            _ => {}
        }
    }

    println!("overall: {}%", manager.overall_progress().await?);
    manager.shutdown().await?;

    Ok(())
}
