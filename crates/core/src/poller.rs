//! Remote job polling under a shared time budget.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{self, Instant};

use crate::{
    error::AnalysisError,
    gateway::{GatewayError, JobGateway, JobRequest, RemoteStatus, Service},
};

/// Wall-clock budget shared by every stage of one job.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    budget: Duration,
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            budget,
            at: Instant::now() + budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn timeout_error(&self) -> AnalysisError {
        AnalysisError::Timeout {
            budget: self.budget,
        }
    }
}

/// How a polled remote job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Value),
    /// The remote job reported its own failure.
    Failed(String),
}

pub struct StagePoller<'a> {
    gateway: &'a dyn JobGateway,
    interval: Duration,
    deadline: Deadline,
}

impl<'a> StagePoller<'a> {
    pub fn new(gateway: &'a dyn JobGateway, interval: Duration, deadline: Deadline) -> Self {
        Self {
            gateway,
            interval,
            deadline,
        }
    }

    /// Create a remote job, bounded by the remaining budget.
    pub async fn create(
        &self,
        service: Service,
        request: &JobRequest,
    ) -> Result<Result<String, GatewayError>, AnalysisError> {
        self.bounded(self.gateway.create_job(service, request)).await
    }

    /// Poll `job_id` until it completes, fails or the deadline passes.
    ///
    /// Transient gateway errors are logged and retried on the next tick. An
    /// undecodable body ends the stage as `MalformedResult`; anything else as
    /// `ServiceUnavailable`.
    pub async fn poll<F>(
        &self,
        service: Service,
        job_id: &str,
        mut on_progress: F,
    ) -> Result<PollOutcome, AnalysisError>
    where
        F: FnMut(u8, &str),
    {
        let mut attempt: u32 = 0;
        loop {
            if self.deadline.expired() {
                return Err(self.deadline.timeout_error());
            }
            attempt += 1;

            match self.bounded(self.gateway.job_status(service, job_id)).await? {
                Ok(RemoteStatus::Running { percent, message }) => {
                    tracing::debug!(%service, job_id, percent, "remote job running");
                    on_progress(percent, &message);
                }
                Ok(RemoteStatus::Complete { result: Some(payload) }) => {
                    return Ok(PollOutcome::Completed(payload));
                }
                Ok(RemoteStatus::Complete { result: None }) => {
                    match self.bounded(self.gateway.fetch_result(service, job_id)).await? {
                        Ok(payload) => return Ok(PollOutcome::Completed(payload)),
                        Err(e) if e.is_transient() => {
                            tracing::debug!(
                                %service,
                                job_id,
                                attempt,
                                error = %e,
                                "result fetch failed, retrying"
                            );
                        }
                        Err(e) => return Err(stage_error(e)),
                    }
                }
                Ok(RemoteStatus::Failed { error }) => return Ok(PollOutcome::Failed(error)),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        %service,
                        job_id,
                        attempt,
                        error = %e,
                        "status poll failed, retrying"
                    );
                }
                Err(e) => return Err(stage_error(e)),
            }

            let pause = self.interval.min(self.deadline.remaining());
            time::sleep(pause).await;
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = T>,
    ) -> Result<T, AnalysisError> {
        time::timeout(self.deadline.remaining(), call)
            .await
            .map_err(|_| self.deadline.timeout_error())
    }
}

fn stage_error(err: GatewayError) -> AnalysisError {
    match err {
        GatewayError::Decode(reason) => AnalysisError::malformed(reason),
        other => AnalysisError::unavailable(other.to_string()),
    }
}
