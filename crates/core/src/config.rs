use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(600);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SUBTITLE_URL: &str = "http://localhost:3001/api/subtitles";
pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8000/api/analysis";

pub const ENV_SUBTITLE_URL: &str = "GLOSSA_SUBTITLE_URL";
pub const ENV_ANALYSIS_URL: &str = "GLOSSA_ANALYSIS_URL";
pub const ENV_POLL_INTERVAL: &str = "GLOSSA_POLL_INTERVAL_SECS";
pub const ENV_TIME_BUDGET: &str = "GLOSSA_TIME_BUDGET_SECS";
pub const ENV_REQUEST_TIMEOUT: &str = "GLOSSA_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("{var} is not a valid http(s) URL: '{value}'")]
    InvalidUrl { var: &'static str, value: String },

    #[error("time budget ({budget:?}) must not be shorter than the poll interval ({interval:?})")]
    BudgetShorterThanInterval {
        budget: Duration,
        interval: Duration,
    },
}

/// Endpoints and timing for the job services.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub subtitle_service_url: String,
    pub analysis_service_url: String,
    pub poll_interval: Duration,
    /// Wall-clock cap per job, enforced client side.
    pub time_budget: Duration,
    pub request_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            subtitle_service_url: DEFAULT_SUBTITLE_URL.to_string(),
            analysis_service_url: DEFAULT_ANALYSIS_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            time_budget: DEFAULT_TIME_BUDGET,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden by whatever `lookup` returns.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_SUBTITLE_URL) {
            config.subtitle_service_url = url;
        }
        if let Some(url) = lookup(ENV_ANALYSIS_URL) {
            config.analysis_service_url = url;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            config.poll_interval = parse_seconds(ENV_POLL_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_TIME_BUDGET) {
            config.time_budget = parse_seconds(ENV_TIME_BUDGET, &value)?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_seconds(ENV_REQUEST_TIMEOUT, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url(ENV_SUBTITLE_URL, &self.subtitle_service_url)?;
        check_url(ENV_ANALYSIS_URL, &self.analysis_service_url)?;

        for (var, value) in [
            (ENV_POLL_INTERVAL, self.poll_interval),
            (ENV_TIME_BUDGET, self.time_budget),
            (ENV_REQUEST_TIMEOUT, self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidSeconds {
                    var,
                    value: "0".to_string(),
                });
            }
        }

        if self.time_budget < self.poll_interval {
            return Err(ConfigError::BudgetShorterThanInterval {
                budget: self.time_budget,
                interval: self.poll_interval,
            });
        }
        Ok(())
    }
}

pub fn parse_seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidSeconds {
        var,
        value: value.to_string(),
    };
    let secs: f64 = value.trim().parse().map_err(|_| invalid())?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn check_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            var,
            value: value.to_string(),
        }),
    }
}
