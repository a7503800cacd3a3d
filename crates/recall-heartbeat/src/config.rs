use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Whether the loop may be started at all.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Workspace root; notes and the log live under `<workspace>/memory/`.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_workspace() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            workspace: default_workspace(),
        }
    }
}

impl HeartbeatConfig {
    /// Tick period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Directory holding `HEARTBEAT.md` and `heartbeat.log`.
    pub fn memory_dir(&self) -> PathBuf {
        self.workspace.join("memory")
    }
}
