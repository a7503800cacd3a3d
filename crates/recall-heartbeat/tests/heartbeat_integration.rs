#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use recall_heartbeat::{HeartbeatConfig, HeartbeatHandler, HeartbeatOutcome, HeartbeatService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Handler that forwards every prompt to a channel and replies with a fixed outcome.
struct Recorder {
    prompts: mpsc::UnboundedSender<String>,
    reply: HeartbeatOutcome,
}

#[async_trait]
impl HeartbeatHandler for Recorder {
    async fn deliver(&self, prompt: &str) -> HeartbeatOutcome {
        let _ = self.prompts.send(prompt.to_string());
        self.reply.clone()
    }
}

fn service_in(
    workspace: &std::path::Path,
    enabled: bool,
    reply: HeartbeatOutcome,
) -> (HeartbeatService, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = HeartbeatConfig {
        enabled,
        interval_secs: 1,
        workspace: workspace.to_path_buf(),
    };
    let handler = Arc::new(Recorder { prompts: tx, reply });
    (HeartbeatService::new(config, handler), rx)
}

// ---------------------------------------------------------------------------
// Single beats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_beat_includes_workspace_notes() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("memory")).unwrap();
    std::fs::write(
        tmp.path().join("memory").join("HEARTBEAT.md"),
        "- check the nightly backup",
    )
    .unwrap();

    let (service, mut prompts) =
        service_in(tmp.path(), false, HeartbeatOutcome::Completed("all quiet".into()));
    let outcome = service.beat().await;
    assert_eq!(outcome, HeartbeatOutcome::Completed("all quiet".into()));

    let prompt = prompts.recv().await.unwrap();
    assert!(prompt.contains("Current time: "));
    assert!(prompt.contains("- check the nightly backup"));
}

#[tokio::test]
async fn test_beat_appends_classified_lines_to_log() {
    let tmp = tempfile::tempdir().unwrap();

    let (done, _rx1) = service_in(tmp.path(), false, HeartbeatOutcome::Completed("ok".into()));
    done.beat().await;
    let (spawned, _rx2) =
        service_in(tmp.path(), false, HeartbeatOutcome::AsyncStarted("job-1".into()));
    spawned.beat().await;
    let (broken, _rx3) = service_in(tmp.path(), false, HeartbeatOutcome::Failed("no model".into()));
    broken.beat().await;

    let log = std::fs::read_to_string(tmp.path().join("memory").join("heartbeat.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.starts_with('[')));
    assert!(lines[0].ends_with("] Heartbeat completed: ok"));
    assert!(lines[1].ends_with("] Async task started: job-1"));
    assert!(lines[2].ends_with("] Heartbeat error: no model"));
}

// ---------------------------------------------------------------------------
// Background loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_disabled_service_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _rx) = service_in(tmp.path(), false, HeartbeatOutcome::Completed("x".into()));
    assert!(service.start().is_err());
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_loop_ticks_until_stopped() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, mut prompts) =
        service_in(tmp.path(), true, HeartbeatOutcome::Completed("tick".into()));

    service.start().unwrap();
    assert!(service.is_running());
    // Second start is a no-op.
    service.start().unwrap();

    let prompt = tokio::time::timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("no heartbeat within timeout")
        .unwrap();
    assert!(prompt.starts_with("# Heartbeat Check"));

    service.stop().await;
    assert!(!service.is_running());
    // Stopping twice is harmless.
    service.stop().await;

    // Drain anything delivered before the stop, then make sure nothing else arrives.
    while prompts.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(prompts.try_recv().is_err());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, mut prompts) =
        service_in(tmp.path(), true, HeartbeatOutcome::Completed("again".into()));

    service.start().unwrap();
    service.stop().await;
    service.start().unwrap();
    assert!(service.is_running());

    tokio::time::timeout(Duration::from_secs(5), prompts.recv())
        .await
        .expect("no heartbeat after restart")
        .unwrap();
    service.stop().await;
}
