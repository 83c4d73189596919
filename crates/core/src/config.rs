use crate::channels::email::EmailConfig;
use crate::classify::ClassifierConfig;
use crate::delivery::{ChannelKind, DeliveryConfig};
use crate::scoring::{ScoreKind, ScoringConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PROVIDER_PATH: &str = "/v1/snapshots";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROVIDER_RETRIES: u32 = 3;

/// Process-level settings from the environment. Engine tuning lives in [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub sentry_dsn: Option<String>,
    pub line_channel_access_token: Option<String>,
    pub line_user_id: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub email_sender: Option<String>,
    pub email_password: Option<String>,
    pub email_receiver: Option<String>,
    pub email_smtp_server: String,
    pub email_smtp_port: u16,
    pub snapshot_provider_base_url: Option<String>,
    pub snapshot_provider_api_key: Option<String>,
    pub snapshot_provider_path: String,
    pub snapshot_provider_timeout_secs: u64,
    pub snapshot_provider_retries: u32,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(s) => s
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} is not valid: {s}")),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            config_path: var("STOCKBELL_CONFIG").map(PathBuf::from),
            data_dir: var("STOCKBELL_DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            log_dir: var("STOCKBELL_LOG_DIR")
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
                .into(),
            sentry_dsn: var("SENTRY_DSN"),
            line_channel_access_token: var("LINE_CHANNEL_ACCESS_TOKEN"),
            line_user_id: var("LINE_USER_ID"),
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID"),
            email_sender: var("EMAIL_SENDER"),
            email_password: var("EMAIL_PASSWORD"),
            email_receiver: var("EMAIL_RECEIVER"),
            email_smtp_server: var("EMAIL_SMTP_SERVER")
                .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
            email_smtp_port: parsed("EMAIL_SMTP_PORT", DEFAULT_SMTP_PORT)?,
            snapshot_provider_base_url: var("SNAPSHOT_PROVIDER_BASE_URL"),
            snapshot_provider_api_key: var("SNAPSHOT_PROVIDER_API_KEY"),
            snapshot_provider_path: var("SNAPSHOT_PROVIDER_PATH")
                .unwrap_or_else(|| DEFAULT_PROVIDER_PATH.to_string()),
            snapshot_provider_timeout_secs: parsed(
                "SNAPSHOT_PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?,
            snapshot_provider_retries: parsed("SNAPSHOT_PROVIDER_RETRIES", DEFAULT_PROVIDER_RETRIES)?,
        })
    }

    /// Settings rooted at one directory, with no channel credentials.
    pub fn local(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_path: None,
            data_dir: root.join(DEFAULT_DATA_DIR),
            log_dir: root.join(DEFAULT_LOG_DIR),
            sentry_dsn: None,
            line_channel_access_token: None,
            line_user_id: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            email_sender: None,
            email_password: None,
            email_receiver: None,
            email_smtp_server: DEFAULT_SMTP_SERVER.to_string(),
            email_smtp_port: DEFAULT_SMTP_PORT,
            snapshot_provider_base_url: None,
            snapshot_provider_api_key: None,
            snapshot_provider_path: DEFAULT_PROVIDER_PATH.to_string(),
            snapshot_provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            snapshot_provider_retries: DEFAULT_PROVIDER_RETRIES,
        }
    }

    pub fn require_snapshot_provider_base_url(&self) -> anyhow::Result<&str> {
        self.snapshot_provider_base_url
            .as_deref()
            .context("SNAPSHOT_PROVIDER_BASE_URL is required")
    }

    pub fn notifications_dir(&self) -> PathBuf {
        self.log_dir.join("notifications")
    }

    pub fn status_path(&self) -> PathBuf {
        self.log_dir.join("notification_status.json")
    }

    pub fn line_credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.line_channel_access_token.as_deref()?,
            self.line_user_id.as_deref()?,
        ))
    }

    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.telegram_bot_token.as_deref()?,
            self.telegram_chat_id.as_deref()?,
        ))
    }

    pub fn email_config(&self) -> Option<EmailConfig> {
        Some(EmailConfig {
            sender: self.email_sender.clone()?,
            password: self.email_password.clone()?,
            receiver: self.email_receiver.clone()?,
            smtp_server: self.email_smtp_server.clone(),
            smtp_port: self.email_smtp_port,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read engine config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse engine config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Tunable engine configuration. Every field has a default; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub classifier: ClassifierConfig,
    pub delivery: DeliveryConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json, path)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Built-in defaults when no path is configured.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                tracing::debug!("no engine config path; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (analysis_type, weights) in self.scoring.weights.iter() {
            for kind in ScoreKind::ALL {
                let w = weights.for_kind(kind);
                if !w.is_finite() || w < 0.0 {
                    return invalid(format!("weight {analysis_type}.{kind} must be >= 0, got {w}"));
                }
            }
            let sum = weights.technical + weights.fundamental + weights.institutional;
            if sum > 1.0 + 1e-9 {
                return invalid(format!("weights for {analysis_type} sum to {sum}, above 1"));
            }
        }
        for (analysis_type, bp) in self.scoring.grades.iter() {
            if !bp.is_descending() {
                return invalid(format!("grade breakpoints for {analysis_type} must be descending"));
            }
        }

        if !self.classifier.pricing.is_valid() {
            return invalid("price multipliers must be positive and monotonic by grade".into());
        }

        self.delivery
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("{e:#}")))?;

        let mut priorities: Vec<u32> = ChannelKind::ALL
            .iter()
            .map(|k| self.delivery.channels.get(*k).priority)
            .collect();
        priorities.sort_unstable();
        priorities.dedup();
        if priorities.len() != ChannelKind::ALL.len() {
            return invalid("channel priorities must be distinct".into());
        }

        Ok(())
    }
}
