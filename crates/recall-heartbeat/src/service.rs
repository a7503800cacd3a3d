use crate::config::HeartbeatConfig;
use crate::handler::{HeartbeatHandler, HeartbeatOutcome};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use recall_core::{RecallError, RecallResult};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notes file read into every prompt.
pub const NOTES_FILE: &str = "HEARTBEAT.md";
/// Append-only record of heartbeat outcomes.
pub const LOG_FILE: &str = "heartbeat.log";

/// Builds the heartbeat prompt for `now` with the workspace `notes` appended.
pub fn build_prompt(now: &DateTime<Local>, notes: &str) -> String {
    format!(
        "# Heartbeat Check\n\
         \n\
         Current time: {}\n\
         \n\
         Look for pending tasks or actions that need attention.\n\
         Go through the notes below for anything that changed.\n\
         Raise problems or improvements before they are asked for.\n\
         \n\
         {notes}\n",
        now.format("%Y-%m-%d %H:%M"),
    )
}

struct Inner {
    config: HeartbeatConfig,
    handler: Arc<dyn HeartbeatHandler>,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs a [`HeartbeatHandler`] on a fixed interval.
///
/// The first tick fires one full interval after [`start`](Self::start).
pub struct HeartbeatService {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for HeartbeatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatService")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl HeartbeatService {
    /// Creates a stopped service.
    pub fn new(config: HeartbeatConfig, handler: Arc<dyn HeartbeatHandler>) -> Self {
        Self {
            inner: Arc::new(Inner { config, handler }),
            running: Mutex::new(None),
        }
    }

    /// The configuration the service was built with.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.inner.config
    }

    /// Whether the background loop is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawns the background loop.
    ///
    /// Does nothing if the loop is already running. Fails when the service
    /// is disabled or the interval is zero. Must be called inside a tokio
    /// runtime.
    pub fn start(&self) -> RecallResult<()> {
        let mut slot = self.running.lock();
        if slot.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Ok(());
        }
        if !self.inner.config.enabled {
            return Err(RecallError::Heartbeat("heartbeat service is disabled".into()));
        }
        if self.inner.config.interval_secs == 0 {
            return Err(RecallError::Heartbeat(
                "heartbeat interval must be at least one second".into(),
            ));
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { inner.run_loop(loop_token).await });

        info!(
            interval_secs = self.inner.config.interval_secs,
            workspace = %self.inner.config.workspace.display(),
            "heartbeat started"
        );
        *slot = Some(Running { token, handle });
        Ok(())
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// A delivery in progress is abandoned. Calling this on a stopped
    /// service is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.token.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "heartbeat loop ended abnormally");
        }
        info!("heartbeat stopped");
    }

    /// Runs one heartbeat cycle immediately and returns its outcome.
    pub async fn beat(&self) -> HeartbeatOutcome {
        self.inner.beat().await
    }
}

impl Drop for HeartbeatService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

impl Inner {
    async fn run_loop(&self, token: CancellationToken) {
        let period = self.config.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("heartbeat cancelled during delivery");
                    break;
                }
                _ = self.beat() => {}
            }
        }
    }

    async fn beat(&self) -> HeartbeatOutcome {
        let memory_dir = self.config.memory_dir();
        let notes = read_notes(&memory_dir).await;
        let prompt = build_prompt(&Local::now(), &notes);

        let outcome = self.handler.deliver(&prompt).await;
        self.record(&memory_dir, &outcome).await;
        outcome
    }

    async fn record(&self, memory_dir: &Path, outcome: &HeartbeatOutcome) {
        match outcome {
            HeartbeatOutcome::Completed(detail) => info!(detail = %detail, "heartbeat completed"),
            HeartbeatOutcome::AsyncStarted(detail) => {
                info!(detail = %detail, "async heartbeat task started");
            }
            HeartbeatOutcome::Failed(detail) => warn!(error = %detail, "heartbeat failed"),
        }

        let line = format!("[{}] {outcome}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        if let Err(e) = append_log(memory_dir, &line).await {
            warn!(
                path = %memory_dir.join(LOG_FILE).display(),
                error = %e,
                "failed to append heartbeat log"
            );
        }
    }
}

/// Reads `HEARTBEAT.md`; a missing or unreadable file yields no notes.
async fn read_notes(memory_dir: &Path) -> String {
    let path = memory_dir.join(NOTES_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(notes) => notes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read heartbeat notes");
            String::new()
        }
    }
}

async fn append_log(memory_dir: &Path, line: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(memory_dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(memory_dir.join(LOG_FILE))
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
