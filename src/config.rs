use crate::assistant::provider::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::session::DEFAULT_SESSION_TTL_MINUTES;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "db";
pub const DATABASE_FILE: &str = "data.db";

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Directory holding the SQLite store.
    #[arg(long, env = "DASHBOARD_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Explicit database file; overrides `--data-dir`.
    #[arg(long, env = "DASHBOARD_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Write JSON logs to daily files here instead of stderr.
    #[arg(long, env = "DASHBOARD_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enables the remote assistant when set.
    #[arg(long, env = "GENAI_API_KEY", hide_env_values = true)]
    pub genai_api_key: Option<String>,

    #[arg(long, env = "GENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub genai_model: String,

    #[arg(long, env = "GENAI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub genai_endpoint: String,

    #[arg(long, env = "GENAI_TIMEOUT_SECONDS", default_value_t = AppConfig::default_genai_timeout())]
    pub genai_timeout_seconds: u64,

    /// Minutes a session may sit idle before it is evicted.
    #[arg(long, env = "DASHBOARD_SESSION_TTL_MINUTES", default_value_t = AppConfig::default_session_ttl_minutes())]
    pub session_ttl_minutes: u64,
}

impl AppConfig {
    const fn default_genai_timeout() -> u64 {
        30
    }

    const fn default_session_ttl_minutes() -> u64 {
        DEFAULT_SESSION_TTL_MINUTES
    }

    /// A config rooted at `data_dir` with everything else defaulted.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }

    /// The API key, ignoring blank values.
    pub fn genai_key(&self) -> Option<&str> {
        self.genai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn genai_timeout(&self) -> Duration {
        Duration::from_secs(self.genai_timeout_seconds)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            db_path: None,
            log_dir: None,
            genai_api_key: None,
            genai_model: DEFAULT_MODEL.to_string(),
            genai_endpoint: DEFAULT_ENDPOINT.to_string(),
            genai_timeout_seconds: Self::default_genai_timeout(),
            session_ttl_minutes: Self::default_session_ttl_minutes(),
        }
    }
}

/// HTTP listener settings for `serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Allowed CORS origins, comma separated; `*` allows any.
    #[arg(long, env = "DASHBOARD_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}
