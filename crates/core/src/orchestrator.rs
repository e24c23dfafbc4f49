//! Job submission and the per-job driver task.
//!
//! Every submitted job runs in its own tokio task. The task owns the
//! [`AnalysisJob`] record, publishes each snapshot over a `watch` channel and
//! hands the final [`JobReport`] over a `oneshot`. Dropping the [`JobHandle`]
//! closes the oneshot, which stops the task at its next await point; the
//! remote jobs are left running.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    assembler::{AssemblyOptions, merge},
    config::OrchestratorConfig,
    error::{AnalysisError, ErrorKind, JobFailed},
    fallback::FallbackSelector,
    gateway::{GatewayError, HttpGateway, JobGateway, JobRequest, Service},
    machine::JobEvent,
    poller::{Deadline, PollOutcome, StagePoller},
    source::{VideoSource, parse_video_ref},
    types::{AnalysisJob, AnalysisOptions, AnalysisResult, Stage},
};

/// Final state of one job: the last snapshot, every stage it passed through
/// and the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job: AnalysisJob,
    pub stages: Vec<Stage>,
    pub outcome: Result<AnalysisResult, JobFailed>,
}

pub struct JobHandle {
    trace_id: Uuid,
    progress: watch::Receiver<AnalysisJob>,
    done_rx: oneshot::Receiver<JobReport>,
}

impl JobHandle {
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> AnalysisJob {
        self.progress.borrow().clone()
    }

    /// Observer receiving every published snapshot; intermediate ones may be
    /// skipped by a slow reader.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisJob> {
        self.progress.clone()
    }

    pub async fn finish(self) -> JobReport {
        let JobHandle {
            progress, done_rx, ..
        } = self;

        match done_rx.await {
            Ok(report) => report,
            Err(_) => {
                let job = progress.borrow().clone();
                JobReport {
                    stages: vec![job.stage],
                    outcome: Err(JobFailed {
                        kind: ErrorKind::ServiceUnavailable,
                        stage: job.stage,
                        message: "job task ended without reporting an outcome".to_string(),
                    }),
                    job,
                }
            }
        }
    }

    pub async fn wait(self) -> Result<AnalysisResult, JobFailed> {
        self.finish().await.outcome
    }

    /// Stop observing; the local task exits at its next await point.
    pub fn abandon(self) {
        tracing::debug!(trace_id = %self.trace_id, "job abandoned by caller");
    }
}

/// Single writer of an [`AnalysisJob`]: applies events, records stage
/// history and publishes snapshots.
pub(crate) struct JobTracker {
    job: AnalysisJob,
    stages: Vec<Stage>,
    tx: watch::Sender<AnalysisJob>,
}

impl JobTracker {
    fn new(job: AnalysisJob, tx: watch::Sender<AnalysisJob>) -> Self {
        Self {
            stages: vec![job.stage],
            job,
            tx,
        }
    }

    pub(crate) fn stage(&self) -> Stage {
        self.job.stage
    }

    pub(crate) fn apply(&mut self, event: JobEvent) {
        match self.job.apply(event) {
            Ok(next) => {
                if next.stage != self.job.stage {
                    tracing::info!(stage = %next.stage, percent = next.percent, "stage entered");
                    self.stages.push(next.stage);
                }
                self.job = next;
                self.tx.send_replace(self.job.clone());
            }
            Err(e) => tracing::warn!(error = %e, "job event ignored"),
        }
    }

    fn into_report(self, outcome: Result<AnalysisResult, JobFailed>) -> JobReport {
        JobReport {
            job: self.job,
            stages: self.stages,
            outcome,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    gateway: Arc<dyn JobGateway>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn JobGateway>, config: OrchestratorConfig) -> Self {
        Self { gateway, config }
    }

    /// Orchestrator talking HTTP to the services named in `config`.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, GatewayError> {
        let gateway = HttpGateway::new(&config)?;
        Ok(Self::new(Arc::new(gateway), config))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate the request and start its driver task.
    ///
    /// Must be called from within a tokio runtime. Rejected references never
    /// reach the services.
    pub fn submit(
        &self,
        video_ref: &str,
        options: AnalysisOptions,
        assembly: AssemblyOptions,
    ) -> Result<JobHandle, AnalysisError> {
        let source = parse_video_ref(video_ref)?;
        options.validate()?;

        let job = AnalysisJob::new(video_ref, options.include_visual_analysis);
        let (tx, progress) = watch::channel(job.clone());
        let (done_tx, done_rx) = oneshot::channel();
        let trace_id = Uuid::new_v4();

        let span = tracing::info_span!("analysis_job", %trace_id, video = %video_ref);
        let driver = Driver {
            gateway: Arc::clone(&self.gateway),
            config: self.config.clone(),
            video_ref: video_ref.to_string(),
            source,
            options,
            assembly,
        };

        tokio::spawn(
            async move {
                let mut done_tx = done_tx;
                let mut tracker = JobTracker::new(job, tx);

                let outcome = tokio::select! {
                    outcome = driver.run(&mut tracker) => outcome,
                    _ = done_tx.closed() => {
                        tracing::info!("job handle dropped, abandoning");
                        return;
                    }
                };

                let outcome = match outcome {
                    Ok(result) => {
                        tracing::info!("job complete");
                        Ok(result)
                    }
                    Err(err) => {
                        let failed = JobFailed::new(&err, tracker.stage());
                        tracing::error!(
                            kind = %failed.kind,
                            stage = %failed.stage,
                            "job failed: {}",
                            failed.message
                        );
                        tracker.apply(JobEvent::Failed {
                            kind: failed.kind,
                            message: failed.message.clone(),
                        });
                        Err(failed)
                    }
                };

                // receiver may be gone by now
                let _ = done_tx.send(tracker.into_report(outcome));
            }
            .instrument(span),
        );

        Ok(JobHandle {
            trace_id,
            progress,
            done_rx,
        })
    }

    /// Submit and wait for the outcome.
    pub async fn run(
        &self,
        video_ref: &str,
        options: AnalysisOptions,
        assembly: AssemblyOptions,
    ) -> Result<AnalysisResult, JobFailed> {
        self.submit(video_ref, options, assembly)
            .map_err(|e| JobFailed::new(&e, Stage::Idle))?
            .wait()
            .await
    }
}

struct Driver {
    gateway: Arc<dyn JobGateway>,
    config: OrchestratorConfig,
    video_ref: String,
    source: VideoSource,
    options: AnalysisOptions,
    assembly: AssemblyOptions,
}

impl Driver {
    async fn run(&self, tracker: &mut JobTracker) -> Result<AnalysisResult, AnalysisError> {
        let deadline = Deadline::after(self.config.time_budget);
        let poller = StagePoller::new(self.gateway.as_ref(), self.config.poll_interval, deadline);

        tracker.apply(JobEvent::Started);
        tracing::debug!(platform = %self.source.platform, "resolving subtitles");

        let selection =
            FallbackSelector::new(&poller, &self.video_ref, &self.options, self.source.platform)
                .select(tracker)
                .await?;

        let analysis = if self.options.include_visual_analysis {
            let payload = self.visual(&poller, tracker).await?;
            tracker.apply(JobEvent::VisualReady);
            Some(payload)
        } else {
            None
        };

        let assembled = merge(
            selection.track,
            Some(selection.strategy),
            analysis.as_ref(),
            self.assembly,
        )?;
        if !assembled.warnings.is_empty() {
            tracing::info!(dropped = assembled.warnings.len(), "result assembled with warnings");
        }
        tracker.apply(JobEvent::Assembled);

        Ok(assembled.result)
    }

    async fn visual(
        &self,
        poller: &StagePoller<'_>,
        tracker: &mut JobTracker,
    ) -> Result<Value, AnalysisError> {
        let request = JobRequest::analysis(&self.video_ref, &self.options);
        let job_id = poller
            .create(Service::Analysis, &request)
            .await?
            .map_err(|e| AnalysisError::unavailable(e.to_string()))?;
        tracker.apply(JobEvent::JobCreated {
            job_id: job_id.clone(),
        });

        let outcome = poller
            .poll(Service::Analysis, &job_id, |percent, message| {
                tracker.apply(JobEvent::Progress {
                    percent,
                    message: message.to_string(),
                })
            })
            .await?;

        match outcome {
            PollOutcome::Completed(payload) => Ok(payload),
            PollOutcome::Failed(error) => Err(AnalysisError::unavailable(format!(
                "visual analysis failed: {}",
                error
            ))),
        }
    }
}
