//! Configuration loader and validator for the staging/production sync.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::assembler::AssemblerConfig;
use crate::import_job::ProcessLauncher;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub staging: Staging,
    pub receiver: ReceiverSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Sender-side assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Staging {
    /// Base URL media paths are resolved against.
    pub uploads_url: String,
    /// Meta keys whose values reference other posts.
    #[serde(default)]
    pub relation_keys: Vec<String>,
}

/// Production-side request handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// Prefix of error messages returned to the sender.
    pub host: String,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    pub import_job: ImportJob,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportJob {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub root: String,
    pub site_url: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins, then `app.database_url`, then a file in `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.app.database_url.clone())
            .unwrap_or_else(|| format!("sqlite://{}/content-stager.db", self.app.data_dir))
    }

    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig::default().with_relation_keys(self.staging.relation_keys.iter().cloned())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver.probe_timeout_ms)
    }

    pub fn import_launcher(&self) -> ProcessLauncher {
        let job = &self.receiver.import_job;
        ProcessLauncher {
            program: job.program.clone(),
            args: job.args.clone(),
            root: PathBuf::from(&job.root),
            site_url: job.site_url.clone(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg
        .app
        .database_url
        .as_deref()
        .is_some_and(|u| u.trim().is_empty())
    {
        return Err(ConfigError::Invalid("app.database_url must be non-empty when set"));
    }

    if cfg.staging.uploads_url.trim().is_empty() {
        return Err(ConfigError::Invalid("staging.uploads_url must be non-empty"));
    }
    if cfg.staging.relation_keys.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Invalid("staging.relation_keys must not contain empty keys"));
    }

    let rx = &cfg.receiver;
    if rx.host.trim().is_empty() {
        return Err(ConfigError::Invalid("receiver.host must be non-empty"));
    }
    if rx.probe_timeout_ms == 0 {
        return Err(ConfigError::Invalid("receiver.probe_timeout_ms must be > 0"));
    }
    if rx.probe_concurrency == 0 {
        return Err(ConfigError::Invalid("receiver.probe_concurrency must be > 0"));
    }
    if rx.import_job.program.trim().is_empty() {
        return Err(ConfigError::Invalid("receiver.import_job.program must be non-empty"));
    }
    if rx.import_job.root.trim().is_empty() {
        return Err(ConfigError::Invalid("receiver.import_job.root must be non-empty"));
    }
    if rx.import_job.site_url.trim().is_empty() {
        return Err(ConfigError::Invalid("receiver.import_job.site_url must be non-empty"));
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

staging:
  uploads_url: "https://stage.example.com/wp-content/uploads"
  relation_keys:
    - "_thumbnail_id"

receiver:
  host: "www.example.com"
  probe_timeout_ms: 5000
  probe_concurrency: 8
  import_job:
    program: "php"
    args:
      - "scripts/import-batch.php"
    root: "/var/www/html"
    site_url: "https://www.example.com"
"#
}
