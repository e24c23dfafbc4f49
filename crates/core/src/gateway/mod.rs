//! Boundary to the remote job services.
//!
//! Two services sit behind the same contract: the subtitle service (official
//! captions or speech-to-text, picked by [`SubtitleMode`]) and the full
//! multimodal analysis service. Both expose job creation, job status and an
//! optional result endpoint.

mod http;
pub mod wire;

pub use http::HttpGateway;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{error::AnalysisError, types::AnalysisOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Subtitle,
    Analysis,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Subtitle => "subtitle",
            Service::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    Official,
    Transcribe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub video_ref: String,
    pub options: AnalysisOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SubtitleMode>,
}

impl JobRequest {
    pub fn subtitles(video_ref: &str, options: &AnalysisOptions, mode: SubtitleMode) -> Self {
        Self {
            video_ref: video_ref.to_string(),
            options: options.clone(),
            mode: Some(mode),
        }
    }

    pub fn analysis(video_ref: &str, options: &AnalysisOptions) -> Self {
        Self {
            video_ref: video_ref.to_string(),
            options: options.clone(),
            mode: None,
        }
    }
}

/// Normalized status of one remote job.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Running { percent: u8, message: String },
    /// `result` is absent when the service expects a separate result fetch.
    Complete { result: Option<Value> },
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("service responded with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("service rejected the request: {message}")]
    Rejected { message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid service URL '{0}'")]
    InvalidUrl(String),
}

impl GatewayError {
    /// Failures worth another poll on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(_) | GatewayError::Unreachable(_) => true,
            GatewayError::Status { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Rejected { .. }
            | GatewayError::Decode(_)
            | GatewayError::InvalidUrl(_) => false,
        }
    }

    /// Classification for a failed job creation.
    pub fn into_submit_error(self, video_ref: &str) -> AnalysisError {
        match self {
            GatewayError::Rejected { message } => AnalysisError::InvalidReference {
                reference: video_ref.to_string(),
                reason: message,
            },
            GatewayError::Status { status, message }
                if (400..500).contains(&status) && status != 429 =>
            {
                AnalysisError::InvalidReference {
                    reference: video_ref.to_string(),
                    reason: format!("HTTP {}: {}", status, message),
                }
            }
            other => AnalysisError::unavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait JobGateway: Send + Sync {
    /// Create a remote job and return its id.
    async fn create_job(
        &self,
        service: Service,
        request: &JobRequest,
    ) -> Result<String, GatewayError>;

    async fn job_status(
        &self,
        service: Service,
        job_id: &str,
    ) -> Result<RemoteStatus, GatewayError>;

    /// Raw result payload of a completed job.
    async fn fetch_result(&self, service: Service, job_id: &str) -> Result<Value, GatewayError>;
}
