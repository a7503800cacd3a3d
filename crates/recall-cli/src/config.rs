use anyhow::Context;
use recall_heartbeat::HeartbeatConfig;
use recall_session::StoreOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `recall.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct RecallConfig {
    /// Root for runtime data; the database lives under `<data_dir>/memory/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub database: StoreOptions,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Legacy JSON import settings.
#[derive(Debug, Deserialize)]
pub struct MigrationConfig {
    /// Import pending legacy files every time the store is opened.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_legacy_dir")]
    pub legacy_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            legacy_dir: default_legacy_dir(),
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: StoreOptions::default(),
            migration: MigrationConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_enabled() -> bool {
    true
}
fn default_legacy_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}

impl RecallConfig {
    /// Reads and parses the config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read config file '{}'", path.display())
                })
            }
        };
        Self::parse(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Parses TOML config text.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Location of the session database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("memory").join("sessions.db")
    }
}
