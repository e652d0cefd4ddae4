use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notice_core::PayloadShape;
use thiserror::Error;
use url::Url;

use crate::fetch::FetchSettings;

pub const DEFAULT_GRID_URL: &str = "https://erp.iitkgp.ac.in/TrainingPlacementSSO/ERPMonitoring.htm";
pub const DEFAULT_GRID_QUERY_ID: &str = "54";
pub const DEFAULT_SINK_BASE: &str = "http://localhost:3000";
pub const DEFAULT_SNAPSHOT_PATH: &str = "notices.json";
pub const DEFAULT_SESSION_FILE: &str = ".session";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const MIN_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Path appended to each sink's base URL.
pub const SINK_PATH: &str = "/api/notices";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{var} is not a valid http(s) url: {message}")]
    InvalidUrl { var: &'static str, message: String },
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("RELAY_SETTLE_DELAY_MS must be at least {min_ms}, got {actual_ms}")]
    SettleDelayTooShort { min_ms: u64, actual_ms: u64 },
    #[error("RELAY_HTTP_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,
}

/// One push target.
#[derive(Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub shape: PayloadShape,
}

impl SinkConfig {
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, SINK_PATH)
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("shape", &self.shape)
            .finish()
    }
}

/// Loads the nearest `.env` into the process environment, returning its
/// path. Variables already set are left alone.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Loads one env file; false when it is missing or malformed.
pub fn load_env_file(path: &Path) -> bool {
    dotenvy::from_path(path).is_ok()
}

/// Everything a run needs, resolved before the pipeline starts.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub notice_page_url: Url,
    pub grid_url: Url,
    pub grid_query_id: String,
    pub alive_url: Url,
    pub session_file: PathBuf,
    /// Push targets in dispatch order.
    pub sinks: Vec<SinkConfig>,
    pub snapshot_path: PathBuf,
    pub request_timeout: Duration,
    pub settle_delay: Duration,
}

impl RelayConfig {
    /// Reads the process environment only. The binary calls
    /// [`load_dotenv`] once at startup, before logging and before this.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let notice_page_url = match get("ERP_NOTICE_URL") {
            None => return Err(ConfigError::Missing("ERP_NOTICE_URL")),
            Some(raw) if raw.is_empty() => return Err(ConfigError::Empty("ERP_NOTICE_URL")),
            Some(raw) => parse_http_url("ERP_NOTICE_URL", &raw)?,
        };
        let grid_url = parse_http_url(
            "ERP_GRID_URL",
            &non_empty_or(get("ERP_GRID_URL"), DEFAULT_GRID_URL),
        )?;
        let alive_url = match get("ERP_ALIVE_URL").filter(|v| !v.is_empty()) {
            Some(raw) => parse_http_url("ERP_ALIVE_URL", &raw)?,
            None => notice_page_url.clone(),
        };

        let noticeboard = SinkConfig {
            name: "noticeboard".to_string(),
            base_url: sink_base("NOTICES_API_BASE", get("NOTICES_API_BASE"))?,
            api_key: required("NOTICES_PUSH_KEY", get("NOTICES_PUSH_KEY"))?,
            shape: PayloadShape::Full,
        };
        let headsup = SinkConfig {
            name: "headsup".to_string(),
            base_url: sink_base("HEADSUP_API_BASE", get("HEADSUP_API_BASE"))?,
            api_key: required("HEADSUP_PUSH_KEY", get("HEADSUP_PUSH_KEY"))?,
            shape: PayloadShape::Minimal,
        };

        let timeout_secs = parse_number(
            "RELAY_HTTP_TIMEOUT_SECS",
            get("RELAY_HTTP_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let settle_ms = parse_number(
            "RELAY_SETTLE_DELAY_MS",
            get("RELAY_SETTLE_DELAY_MS"),
            DEFAULT_SETTLE_DELAY.as_millis() as u64,
        )?;
        let min_ms = MIN_SETTLE_DELAY.as_millis() as u64;
        if settle_ms < min_ms {
            return Err(ConfigError::SettleDelayTooShort {
                min_ms,
                actual_ms: settle_ms,
            });
        }

        Ok(Self {
            notice_page_url,
            grid_url,
            grid_query_id: non_empty_or(get("ERP_GRID_QUERY_ID"), DEFAULT_GRID_QUERY_ID),
            alive_url,
            session_file: PathBuf::from(non_empty_or(
                get("ERP_SESSION_FILE"),
                DEFAULT_SESSION_FILE,
            )),
            sinks: vec![noticeboard, headsup],
            snapshot_path: PathBuf::from(non_empty_or(
                get("NOTICES_SNAPSHOT_PATH"),
                DEFAULT_SNAPSHOT_PATH,
            )),
            request_timeout: Duration::from_secs(timeout_secs),
            settle_delay: Duration::from_millis(settle_ms),
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: self.request_timeout,
            settle_delay: self.settle_delay,
            grid_query_id: self.grid_query_id.clone(),
            ..FetchSettings::default()
        }
    }
}

/// Trims whitespace plus trailing `/` and `:` so `{base}/api/notices` is well formed.
pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches(['/', ':']).to_string()
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn required(var: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::Missing(var)),
        Some(v) if v.is_empty() => Err(ConfigError::Empty(var)),
        Some(v) => Ok(v),
    }
}

fn sink_base(var: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let base = normalize_base_url(&non_empty_or(value, DEFAULT_SINK_BASE));
    parse_http_url(var, &base)?;
    Ok(base)
}

fn parse_http_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
        var,
        message: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            message: format!("unsupported scheme {other}"),
        }),
    }
}

fn parse_number(var: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}
