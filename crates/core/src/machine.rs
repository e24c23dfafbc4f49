//! Job state machine.
//!
//! `transition` is pure: it takes a job snapshot and an event and returns the
//! next snapshot. The orchestrator task is the only caller that feeds it
//! real events; timers and network calls live elsewhere.

use thiserror::Error;

use crate::{
    error::ErrorKind,
    types::{AnalysisJob, JobError, SourceStrategy, Stage},
};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The job was accepted locally and the subtitle stage begins.
    Started,
    /// First remote job id became known.
    JobCreated { job_id: String },
    /// Remote progress for the current stage, 0-100 of that stage.
    Progress { percent: u8, message: String },
    /// Official captions failed or came back empty.
    CaptionsMissing { reason: String },
    SubtitlesReady,
    VisualReady,
    Assembled,
    Failed { kind: ErrorKind, message: String },
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Started => "started",
            JobEvent::JobCreated { .. } => "job_created",
            JobEvent::Progress { .. } => "progress",
            JobEvent::CaptionsMissing { .. } => "captions_missing",
            JobEvent::SubtitlesReady => "subtitles_ready",
            JobEvent::VisualReady => "visual_ready",
            JobEvent::Assembled => "assembled",
            JobEvent::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("event '{event}' is not valid in stage '{from}'")]
pub struct InvalidTransition {
    pub from: Stage,
    pub event: &'static str,
}

pub fn transition(job: &AnalysisJob, event: JobEvent) -> Result<AnalysisJob, InvalidTransition> {
    let invalid = InvalidTransition {
        from: job.stage,
        event: event.name(),
    };
    if job.is_terminal() {
        return Err(invalid);
    }

    let mut next = job.clone();
    match (job.stage, event) {
        (Stage::Idle, JobEvent::Started) => enter(&mut next, Stage::Subtitle),
        (_, JobEvent::Failed { kind, message }) => {
            next.stage = Stage::Error;
            next.error = Some(JobError {
                kind,
                message: message.clone(),
            });
            next.message = message;
        }
        (Stage::Idle, _) => return Err(invalid),
        (_, JobEvent::JobCreated { job_id }) => {
            if next.id.is_none() {
                next.id = Some(job_id);
            }
        }
        (stage, JobEvent::Progress { percent, message }) => {
            next.percent = next.percent.max(scale_into_band(stage, percent));
            if !message.is_empty() {
                next.message = message;
            }
        }
        (Stage::Subtitle, JobEvent::CaptionsMissing { reason }) => {
            next.source_strategy = Some(SourceStrategy::SpeechToText);
            enter(&mut next, Stage::SubtitleRetry);
            next.message = format!("{} ({})", Stage::SubtitleRetry.label(), reason);
        }
        (Stage::Subtitle, JobEvent::SubtitlesReady) => {
            next.source_strategy = Some(SourceStrategy::OfficialCaptions);
            enter(&mut next, stage_after_subtitles(job));
        }
        (Stage::SubtitleRetry, JobEvent::SubtitlesReady) => {
            enter(&mut next, stage_after_subtitles(job));
        }
        (Stage::Visual, JobEvent::VisualReady) => enter(&mut next, Stage::Merging),
        (Stage::Merging, JobEvent::Assembled) => enter(&mut next, Stage::Complete),
        _ => return Err(invalid),
    }
    Ok(next)
}

impl AnalysisJob {
    pub fn apply(&self, event: JobEvent) -> Result<AnalysisJob, InvalidTransition> {
        transition(self, event)
    }
}

fn stage_after_subtitles(job: &AnalysisJob) -> Stage {
    if job.include_visual_analysis {
        Stage::Visual
    } else {
        Stage::Merging
    }
}

fn enter(job: &mut AnalysisJob, stage: Stage) {
    job.stage = stage;
    job.percent = job.percent.max(stage.percent_band().0);
    job.message = stage.label().to_string();
}

fn scale_into_band(stage: Stage, percent: u8) -> u8 {
    let (lo, hi) = stage.percent_band();
    let span = u16::from(hi - lo);
    lo + (span * u16::from(percent.min(100)) / 100) as u8
}
