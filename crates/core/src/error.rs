use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{source::SourceError, types::Stage};

/// Programmatic classification of a failed analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidReference,
    ServiceUnavailable,
    NoCaptionsAvailable,
    TranscriptionFailure,
    MalformedResult,
    Timeout,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidReference => "InvalidReference",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::NoCaptionsAvailable => "NoCaptionsAvailable",
            ErrorKind::TranscriptionFailure => "TranscriptionFailure",
            ErrorKind::MalformedResult => "MalformedResult",
            ErrorKind::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid video reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Invalid analysis options: {reason}")]
    InvalidOptions { reason: String },

    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("No captions available: {reason}")]
    NoCaptionsAvailable { reason: String },

    #[error("Transcription failed: {reason}")]
    TranscriptionFailure { reason: String },

    #[error("Malformed result: {reason}")]
    MalformedResult { reason: String },

    #[error(
        "Timed out after {}s waiting for the analysis service (the remote job may still be running)",
        budget.as_secs()
    )]
    Timeout { budget: Duration },
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InvalidReference { .. } | AnalysisError::InvalidOptions { .. } => {
                ErrorKind::InvalidReference
            }
            AnalysisError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            AnalysisError::NoCaptionsAvailable { .. } => ErrorKind::NoCaptionsAvailable,
            AnalysisError::TranscriptionFailure { .. } => ErrorKind::TranscriptionFailure,
            AnalysisError::MalformedResult { .. } => ErrorKind::MalformedResult,
            AnalysisError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AnalysisError::MalformedResult {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        AnalysisError::ServiceUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<SourceError> for AnalysisError {
    fn from(err: SourceError) -> Self {
        AnalysisError::InvalidReference {
            reference: err.reference().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Terminal failure of one job, as handed to whoever awaits it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} during {stage}: {message}")]
pub struct JobFailed {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl JobFailed {
    pub fn new(err: &AnalysisError, stage: Stage) -> Self {
        Self {
            kind: err.kind(),
            stage,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_options_report_as_invalid_reference() {
        let err = AnalysisError::InvalidOptions {
            reason: "frame interval must be positive".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[test]
    fn timeout_message_is_distinct_from_service_failure() {
        let timeout = AnalysisError::Timeout {
            budget: Duration::from_secs(600),
        };
        let unavailable = AnalysisError::unavailable("HTTP 503");
        assert!(timeout.to_string().contains("Timed out after 600s"));
        assert_ne!(timeout.kind(), unavailable.kind());
    }

    #[test]
    fn error_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::NoCaptionsAvailable).unwrap();
        assert_eq!(json, "\"NoCaptionsAvailable\"");
    }
}
