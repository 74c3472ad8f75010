//! Server configuration file types.
//!
//! `FileConfig` mirrors the optional `apiflow.toml`; every field has a
//! default so an empty file is valid. Environment variables override it.

use serde::{Deserialize, Serialize};

/// Where the SQLite database lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbMode {
    /// Database file inside a mounted volume (`DB_VOLUME_PATH/DB_NAME.db`).
    Embedded,
    /// Database file at an explicit path (`DB_PATH`).
    #[default]
    Local,
    /// Hosted database reached over the network (`DB_NAME` + `DB_TOKEN`).
    Remote,
}

impl std::str::FromStr for DbMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(DbMode::Embedded),
            "local" => Ok(DbMode::Local),
            "remote" => Ok(DbMode::Remote),
            other => Err(format!("unknown DB_MODE '{other}' (expected embedded, local or remote)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub db_mode: DbMode,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default)]
    pub db_path: Option<String>,

    #[serde(default)]
    pub db_volume_path: Option<String>,

    /// Whole-run limit for flows that do not set their own. Unbounded if absent.
    #[serde(default)]
    pub flow_timeout_secs: Option<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of each run's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_db_name() -> String {
    "apiflow".to_string()
}

fn default_request_timeout_secs() -> u64 {
    3600
}

fn default_event_buffer() -> usize {
    256
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_mode: DbMode::default(),
            db_name: default_db_name(),
            db_path: None,
            db_volume_path: None,
            flow_timeout_secs: None,
            request_timeout_secs: default_request_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}
