use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ErrorKind};

/// Named phase of job progress, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Idle,
    Subtitle,
    SubtitleRetry,
    Visual,
    Merging,
    Complete,
    Error,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Subtitle => "subtitle",
            Stage::SubtitleRetry => "subtitleRetry",
            Stage::Visual => "visual",
            Stage::Merging => "merging",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "Preparing",
            Stage::Subtitle => "Fetching official captions",
            Stage::SubtitleRetry => "Transcribing audio",
            Stage::Visual => "Analyzing frames",
            Stage::Merging => "Merging results",
            Stage::Complete => "Complete",
            Stage::Error => "Failed",
        }
    }

    /// Slice of the overall 0-100 progress owned by this stage.
    pub fn percent_band(&self) -> (u8, u8) {
        match self {
            Stage::Idle => (0, 0),
            Stage::Subtitle => (0, 30),
            Stage::SubtitleRetry => (30, 50),
            Stage::Visual => (50, 90),
            Stage::Merging => (90, 99),
            Stage::Complete => (100, 100),
            Stage::Error => (0, 100),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which subtitle path produced the job's subtitle track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStrategy {
    OfficialCaptions,
    SpeechToText,
}

impl SourceStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SourceStrategy::OfficialCaptions => "official-captions",
            SourceStrategy::SpeechToText => "speech-to-text",
        }
    }
}

impl fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    #[default]
    All,
    Ocr,
    Scene,
}

impl VisualMode {
    pub fn name(&self) -> &'static str {
        match self {
            VisualMode::All => "all",
            VisualMode::Ocr => "ocr",
            VisualMode::Scene => "scene",
        }
    }
}

pub const DEFAULT_FRAME_INTERVAL: f64 = 2.0;
pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub include_visual_analysis: bool,
    pub visual_mode: VisualMode,
    pub frame_interval: f64,
    pub language: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_visual_analysis: true,
            visual_mode: VisualMode::All,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.frame_interval.is_finite() || self.frame_interval <= 0.0 {
            return Err(AnalysisError::InvalidOptions {
                reason: format!(
                    "frame interval must be a positive number of seconds, got {}",
                    self.frame_interval
                ),
            });
        }
        if self.language.trim().is_empty() {
            return Err(AnalysisError::InvalidOptions {
                reason: "language code must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Client-side view of one analysis request. Only the orchestrator task
/// mutates it; everyone else sees snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: Option<String>,
    pub video_ref: String,
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
    pub source_strategy: Option<SourceStrategy>,
    pub include_visual_analysis: bool,
    pub error: Option<JobError>,
}

impl AnalysisJob {
    pub fn new(video_ref: impl Into<String>, include_visual_analysis: bool) -> Self {
        Self {
            id: None,
            video_ref: video_ref.into(),
            stage: Stage::Idle,
            percent: 0,
            message: String::new(),
            source_strategy: None,
            include_visual_analysis,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleItem {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl SubtitleItem {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualFrame {
    pub timestamp: f64,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub timestamp: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Terminal artifact bundle of a completed job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub subtitles: Vec<SubtitleItem>,
    pub visual_content: Vec<VisualFrame>,
    pub scene_descriptions: Vec<SceneDescription>,
    pub glossary: Vec<GlossaryTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_source: Option<SourceStrategy>,
}
