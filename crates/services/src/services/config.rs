//! Runtime configuration, read from the environment (after `.env` is loaded).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_allowed_origins: Vec<String>,
    pub ai: AiConfig,
    /// Profile used when a request carries no `X-Profile-Id` header
    pub default_profile_id: Uuid,
    /// Progress (percent) at which a goal update completes the goal
    pub goal_completion_threshold: i64,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: Url,
    pub default_model: String,
    pub timeout: Duration,
    pub cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://quest_log.db?mode=rwc".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            ai: AiConfig::default(),
            default_profile_id: Uuid::nil(),
            goal_completion_threshold: 80,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:11434").expect("static url"),
            default_model: "llama3.2:3b".to_string(),
            timeout: Duration::from_secs(20),
            cooldown: Duration::from_secs(60),
        }
    }
}

fn parsed<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }

        let host = lookup("HOST").unwrap_or_else(|| config.bind_addr.ip().to_string());
        let port = match lookup("PORT") {
            Some(raw) => parsed::<u16>("PORT", &raw)?,
            None => config.bind_addr.port(),
        };
        config.bind_addr = parsed("HOST", &format!("{host}:{port}"))?;

        if let Some(raw) = lookup("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = lookup("OLLAMA_URL") {
            config.ai.base_url = Url::parse(raw.trim()).map_err(|_| ConfigError::Invalid {
                key: "OLLAMA_URL",
                value: raw.clone(),
            })?;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            config.ai.default_model = model;
        }
        if let Some(raw) = lookup("AI_TIMEOUT_SECS") {
            config.ai.timeout = Duration::from_secs(parsed("AI_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("AI_COOLDOWN_SECS") {
            config.ai.cooldown = Duration::from_secs(parsed("AI_COOLDOWN_SECS", &raw)?);
        }

        if let Some(raw) = lookup("DEFAULT_PROFILE_ID") {
            config.default_profile_id = parsed("DEFAULT_PROFILE_ID", &raw)?;
        }
        if let Some(raw) = lookup("GOAL_COMPLETION_THRESHOLD") {
            let threshold: i64 = parsed("GOAL_COMPLETION_THRESHOLD", &raw)?;
            if !(0..=100).contains(&threshold) {
                return Err(ConfigError::Invalid {
                    key: "GOAL_COMPLETION_THRESHOLD",
                    value: raw,
                });
            }
            config.goal_completion_threshold = threshold;
        }

        Ok(config)
    }
}
