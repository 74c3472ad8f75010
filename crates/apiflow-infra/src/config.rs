//! Server configuration loader.
//!
//! An optional TOML file named by `APIFLOW_CONFIG` supplies defaults;
//! environment variables override it. Secrets only ever come from the
//! environment and are held as [`SecretString`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use apiflow_types::config::{DbMode, FileConfig};
use secrecy::SecretString;

pub const CONFIG_PATH_VAR: &str = "APIFLOW_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

fn invalid(name: impl Into<String>, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: name.into(),
        reason: reason.to_string(),
    }
}

/// Where the database file lives once the mode has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLocation {
    pub mode: DbMode,
    pub path: PathBuf,
}

impl DatabaseLocation {
    /// sqlx connection URL; the file is created when missing.
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub database: DatabaseLocation,
    pub hmac_secret: SecretString,
    pub magic_link_secret: Option<SecretString>,
    pub aws_access_key: Option<SecretString>,
    pub aws_secret_key: Option<SecretString>,
    pub db_username: Option<String>,
    pub email_invite_template_path: Option<PathBuf>,
    pub flow_timeout: Option<Duration>,
    pub request_timeout: Duration,
    pub event_buffer: usize,
}

/// Load from `APIFLOW_CONFIG` (if set) and the process environment.
pub async fn load_server_config() -> Result<ServerConfig, ConfigError> {
    let file = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.trim().is_empty() => read_config_file(Path::new(path.trim())).await?,
        _ => FileConfig::default(),
    };
    resolve(file, |name| std::env::var(name).ok())
}

/// Parse a config file. A missing file is an error here, since the operator
/// named it explicitly.
pub async fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| invalid(CONFIG_PATH_VAR, format!("{}: {e}", path.display())))?;
    let config = toml::from_str::<FileConfig>(&content)
        .map_err(|e| invalid(CONFIG_PATH_VAR, format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "config file loaded");
    Ok(config)
}

/// Apply environment overrides from `env` on top of `file` and validate.
pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<ServerConfig, ConfigError> {
    let var = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let secret = |name: &str| var(name).map(SecretString::from);

    let port = match var("PORT") {
        Some(p) => p.parse::<u16>().map_err(|e| invalid("PORT", e))?,
        None => file.port,
    };
    let hmac_secret = secret("HMAC_SECRET").ok_or(ConfigError::Missing("HMAC_SECRET"))?;

    let mode = match var("DB_MODE") {
        Some(m) => m.parse::<DbMode>().map_err(|e| invalid("DB_MODE", e))?,
        None => file.db_mode,
    };
    let db_name = var("DB_NAME").unwrap_or(file.db_name);
    let path = match mode {
        DbMode::Local => var("DB_PATH")
            .or(file.db_path)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("DB_PATH"))?,
        DbMode::Embedded => var("DB_VOLUME_PATH")
            .or(file.db_volume_path)
            .map(|dir| Path::new(&dir).join(format!("{db_name}.db")))
            .ok_or(ConfigError::Missing("DB_VOLUME_PATH"))?,
        DbMode::Remote => {
            if var("DB_TOKEN").is_none() {
                return Err(ConfigError::Missing("DB_TOKEN"));
            }
            return Err(ConfigError::Unsupported(format!(
                "DB_MODE=remote ({db_name}): this build only opens SQLite files; use local or embedded"
            )));
        }
    };
    if var("DB_ENCRYPTION_KEY").is_some() {
        return Err(ConfigError::Unsupported(
            "DB_ENCRYPTION_KEY: database encryption is not available in this build".into(),
        ));
    }

    let flow_timeout = match var("FLOW_TIMEOUT_SECS") {
        Some(s) => Some(s.parse::<u64>().map_err(|e| invalid("FLOW_TIMEOUT_SECS", e))?),
        None => file.flow_timeout_secs,
    }
    .filter(|secs| *secs > 0)
    .map(Duration::from_secs);
    let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
        Some(s) => s.parse::<u64>().map_err(|e| invalid("REQUEST_TIMEOUT_SECS", e))?,
        None => file.request_timeout_secs,
    };
    if request_timeout == 0 {
        return Err(invalid("REQUEST_TIMEOUT_SECS", "must be greater than zero"));
    }

    let aws_access_key = secret("AWS_ACCESS_KEY");
    let aws_secret_key = secret("AWS_SECRET_KEY");
    if aws_access_key.is_some() != aws_secret_key.is_some() {
        tracing::warn!("only one of AWS_ACCESS_KEY and AWS_SECRET_KEY is set; email invites are disabled");
    }

    let config = ServerConfig {
        port,
        database: DatabaseLocation { mode, path },
        hmac_secret,
        magic_link_secret: secret("MAGIC_LINK_SECRET"),
        aws_access_key,
        aws_secret_key,
        db_username: var("DB_USERNAME"),
        email_invite_template_path: var("EMAIL_INVITE_TEMPLATE_PATH").map(PathBuf::from),
        flow_timeout,
        request_timeout: Duration::from_secs(request_timeout),
        event_buffer: file.event_buffer.max(1),
    };
    tracing::info!(
        port = config.port,
        db_mode = ?config.database.mode,
        db_path = %config.database.path.display(),
        "configuration loaded"
    );
    Ok(config)
}
