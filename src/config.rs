//! Process configuration from the environment

use crate::domain::seed::DEFAULT_PATIENT_ID;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be at least 1")]
    Zero { var: &'static str },
}

/// Everything the server reads at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_ttl_minutes: u32,
    pub step_limit: u32,
    pub chat_batch_threshold: usize,
    pub voice_batch_threshold: usize,
    pub decision_timeout: Option<Duration>,
    pub patient_id: Uuid,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub router_model: String,
    pub specialist_model: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and empty values take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let db_path = get("CARELINE_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".careline").join("sessions.db")
            },
            PathBuf::from,
        );

        let session_ttl_minutes = parse_or(&get, "CARELINE_SESSION_TTL_MINUTES", 15)?;
        let step_limit = parse_or(&get, "CARELINE_STEP_LIMIT", 10)?;
        let chat_batch_threshold = parse_or(&get, "CARELINE_CHAT_BATCH_THRESHOLD", 10)?;
        let voice_batch_threshold = parse_or(&get, "CARELINE_VOICE_BATCH_THRESHOLD", 20)?;

        Ok(Self {
            host: parse_or(&get, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&get, "PORT", 8000)?,
            db_path,
            session_ttl_minutes: positive(session_ttl_minutes, "CARELINE_SESSION_TTL_MINUTES")?,
            step_limit: positive(step_limit, "CARELINE_STEP_LIMIT")?,
            chat_batch_threshold: positive(chat_batch_threshold, "CARELINE_CHAT_BATCH_THRESHOLD")?,
            voice_batch_threshold: positive(voice_batch_threshold, "CARELINE_VOICE_BATCH_THRESHOLD")?,
            decision_timeout: parse_opt::<u64>(&get, "CARELINE_DECISION_TIMEOUT_SECS")?
                .map(|secs| positive(secs, "CARELINE_DECISION_TIMEOUT_SECS"))
                .transpose()?
                .map(Duration::from_secs),
            patient_id: parse_or(&get, "CARELINE_PATIENT_ID", DEFAULT_PATIENT_ID)?,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            router_model: get("CARELINE_ROUTER_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            specialist_model: get("CARELINE_SPECIALIST_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_ttl_minutes))
    }
}

fn parse_opt<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            let parsed = value.trim().parse();
            parsed.map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_opt(get, var)?.unwrap_or(default))
}

fn positive<T: PartialOrd + From<u8>>(value: T, var: &'static str) -> Result<T, ConfigError> {
    if value < T::from(1) {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}
