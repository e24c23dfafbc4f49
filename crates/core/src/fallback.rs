//! Subtitle source selection: official captions first, transcription second.

use crate::{
    assembler::{SubtitleTrack, subtitles_from_payload},
    error::{AnalysisError, ErrorKind},
    gateway::{JobRequest, Service, SubtitleMode},
    machine::JobEvent,
    orchestrator::JobTracker,
    poller::{PollOutcome, StagePoller},
    source::Platform,
    types::{AnalysisOptions, SourceStrategy},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSelection {
    pub strategy: SourceStrategy,
    pub track: SubtitleTrack,
}

enum Attempt {
    Ready(SubtitleTrack),
    Missing(String),
}

pub struct FallbackSelector<'a> {
    poller: &'a StagePoller<'a>,
    video_ref: &'a str,
    options: &'a AnalysisOptions,
    platform: Platform,
}

impl<'a> FallbackSelector<'a> {
    pub fn new(
        poller: &'a StagePoller<'a>,
        video_ref: &'a str,
        options: &'a AnalysisOptions,
        platform: Platform,
    ) -> Self {
        Self {
            poller,
            video_ref,
            options,
            platform,
        }
    }

    /// Runs the subtitle stage to completion, leaving the job in `visual` or
    /// `merging`. Timeouts and unavailable services end the job instead of
    /// triggering the fallback.
    pub(crate) async fn select(
        &self,
        tracker: &mut JobTracker,
    ) -> Result<SubtitleSelection, AnalysisError> {
        let has_official = self.platform.has_official_captions();

        let reason = if has_official {
            match self.official(tracker).await? {
                Attempt::Ready(track) => {
                    tracker.apply(JobEvent::SubtitlesReady);
                    return Ok(SubtitleSelection {
                        strategy: SourceStrategy::OfficialCaptions,
                        track,
                    });
                }
                Attempt::Missing(reason) => reason,
            }
        } else {
            format!("{} sources carry no platform captions", self.platform.name())
        };

        tracing::warn!(%reason, "official captions unavailable, falling back to transcription");
        tracker.apply(JobEvent::CaptionsMissing { reason });

        let track = self.transcribe(tracker, !has_official).await?;
        tracker.apply(JobEvent::SubtitlesReady);
        Ok(SubtitleSelection {
            strategy: SourceStrategy::SpeechToText,
            track,
        })
    }

    async fn official(&self, tracker: &mut JobTracker) -> Result<Attempt, AnalysisError> {
        let request = JobRequest::subtitles(self.video_ref, self.options, SubtitleMode::Official);
        let job_id = self
            .poller
            .create(Service::Subtitle, &request)
            .await?
            .map_err(|e| e.into_submit_error(self.video_ref))?;
        tracker.apply(JobEvent::JobCreated {
            job_id: job_id.clone(),
        });

        let outcome = self
            .poller
            .poll(Service::Subtitle, &job_id, |percent, message| {
                tracker.apply(JobEvent::Progress {
                    percent,
                    message: message.to_string(),
                })
            })
            .await;

        let payload = match outcome {
            Ok(PollOutcome::Completed(payload)) => payload,
            Ok(PollOutcome::Failed(error)) => {
                return Ok(Attempt::Missing(format!("official captions failed: {}", error)));
            }
            Err(e) if e.kind() == ErrorKind::MalformedResult => {
                return Ok(Attempt::Missing(format!("official captions unusable: {}", e)));
            }
            Err(e) => return Err(e),
        };

        Ok(match subtitles_from_payload(&payload) {
            Ok(track) if track.is_empty() => {
                Attempt::Missing("official captions are empty".to_string())
            }
            Ok(track) => Attempt::Ready(track),
            Err(e) => Attempt::Missing(format!("official captions unusable: {}", e)),
        })
    }

    /// `first_request` is set when no job was created for this video yet, so
    /// a rejection still speaks about the reference itself.
    async fn transcribe(
        &self,
        tracker: &mut JobTracker,
        first_request: bool,
    ) -> Result<SubtitleTrack, AnalysisError> {
        let request =
            JobRequest::subtitles(self.video_ref, self.options, SubtitleMode::Transcribe);
        let job_id = self
            .poller
            .create(Service::Subtitle, &request)
            .await?
            .map_err(|e| {
                if first_request {
                    e.into_submit_error(self.video_ref)
                } else if e.is_transient() {
                    AnalysisError::unavailable(e.to_string())
                } else {
                    AnalysisError::TranscriptionFailure {
                        reason: e.to_string(),
                    }
                }
            })?;
        tracker.apply(JobEvent::JobCreated {
            job_id: job_id.clone(),
        });

        let outcome = self
            .poller
            .poll(Service::Subtitle, &job_id, |percent, message| {
                tracker.apply(JobEvent::Progress {
                    percent,
                    message: message.to_string(),
                })
            })
            .await?;

        match outcome {
            PollOutcome::Failed(error) => Err(AnalysisError::TranscriptionFailure { reason: error }),
            PollOutcome::Completed(payload) => {
                let track = subtitles_from_payload(&payload)?;
                if track.is_empty() {
                    return Err(AnalysisError::NoCaptionsAvailable {
                        reason: "no official captions and transcription found no speech"
                            .to_string(),
                    });
                }
                Ok(track)
            }
        }
    }
}
