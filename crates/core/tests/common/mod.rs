//! Scripted in-memory gateway for driving the orchestrator in tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use glossa_core::{
    GatewayError, JobGateway, Orchestrator, OrchestratorConfig, RemoteStatus, Service,
    gateway::{JobRequest, SubtitleMode},
};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Official,
    Transcribe,
    Analysis,
}

impl Route {
    fn of(service: Service, request: &JobRequest) -> Self {
        match (service, request.mode) {
            (Service::Analysis, _) => Route::Analysis,
            (Service::Subtitle, Some(SubtitleMode::Transcribe)) => Route::Transcribe,
            (Service::Subtitle, _) => Route::Official,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Route::Official => "official",
            Route::Transcribe => "transcribe",
            Route::Analysis => "analysis",
        }
    }

    fn from_job_id(job_id: &str) -> Option<Self> {
        [Route::Official, Route::Transcribe, Route::Analysis]
            .into_iter()
            .find(|route| job_id.starts_with(route.prefix()))
    }
}

enum Step {
    Status(RemoteStatus),
    Transient,
    Permanent(u16),
    Undecodable,
}

enum CreateFailure {
    Rejected(String),
    Status(u16),
}

/// Status sequence played back for one route. Once exhausted the job keeps
/// reporting itself as running.
#[derive(Default)]
pub struct Script {
    create_failure: Option<CreateFailure>,
    steps: VecDeque<Step>,
    result: Option<Value>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(mut self, percent: u8) -> Self {
        self.steps.push_back(Step::Status(RemoteStatus::Running {
            percent,
            message: format!("working {}%", percent),
        }));
        self
    }

    pub fn transient(mut self) -> Self {
        self.steps.push_back(Step::Transient);
        self
    }

    pub fn permanent(mut self, status: u16) -> Self {
        self.steps.push_back(Step::Permanent(status));
        self
    }

    /// Status endpoint answers with a body that cannot be decoded.
    pub fn undecodable(mut self) -> Self {
        self.steps.push_back(Step::Undecodable);
        self
    }

    pub fn complete(mut self, payload: Value) -> Self {
        self.steps.push_back(Step::Status(RemoteStatus::Complete {
            result: Some(payload),
        }));
        self
    }

    /// Completes without an inline result; the payload is served by the
    /// result endpoint instead.
    pub fn complete_deferred(mut self, payload: Value) -> Self {
        self.steps
            .push_back(Step::Status(RemoteStatus::Complete { result: None }));
        self.result = Some(payload);
        self
    }

    pub fn fail(mut self, error: &str) -> Self {
        self.steps.push_back(Step::Status(RemoteStatus::Failed {
            error: error.to_string(),
        }));
        self
    }

    pub fn reject(mut self, message: &str) -> Self {
        self.create_failure = Some(CreateFailure::Rejected(message.to_string()));
        self
    }

    pub fn create_status(mut self, status: u16) -> Self {
        self.create_failure = Some(CreateFailure::Status(status));
        self
    }
}

#[derive(Default)]
pub struct FakeGateway {
    scripts: Mutex<HashMap<Route, Script>>,
    created: Mutex<Vec<Route>>,
    polls: Mutex<HashMap<Route, usize>>,
    requests: Mutex<Vec<JobRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, route: Route, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(route, script);
        self
    }

    pub fn created(&self) -> Vec<Route> {
        self.created.lock().unwrap().clone()
    }

    pub fn polls(&self, route: Route) -> usize {
        self.polls.lock().unwrap().get(&route).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobGateway for FakeGateway {
    async fn create_job(
        &self,
        service: Service,
        request: &JobRequest,
    ) -> Result<String, GatewayError> {
        let route = Route::of(service, request);
        self.requests.lock().unwrap().push(request.clone());
        self.created.lock().unwrap().push(route);

        let scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get(&route) else {
            return Err(GatewayError::Status {
                status: 500,
                message: format!("no script for {:?}", route),
            });
        };
        match &script.create_failure {
            Some(CreateFailure::Rejected(message)) => Err(GatewayError::Rejected {
                message: message.clone(),
            }),
            Some(CreateFailure::Status(status)) => Err(GatewayError::Status {
                status: *status,
                message: "scripted failure".to_string(),
            }),
            None => Ok(format!("{}-1", route.prefix())),
        }
    }

    async fn job_status(
        &self,
        _service: Service,
        job_id: &str,
    ) -> Result<RemoteStatus, GatewayError> {
        let route = Route::from_job_id(job_id)
            .ok_or_else(|| GatewayError::Decode(format!("unknown job {}", job_id)))?;
        *self.polls.lock().unwrap().entry(route).or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let step = scripts
            .get_mut(&route)
            .and_then(|script| script.steps.pop_front());
        match step {
            Some(Step::Status(status)) => Ok(status),
            Some(Step::Transient) => Err(GatewayError::Unreachable("connection reset".into())),
            Some(Step::Permanent(status)) => Err(GatewayError::Status {
                status,
                message: "scripted failure".to_string(),
            }),
            Some(Step::Undecodable) => Err(GatewayError::Decode(
                "job status carries neither stage nor status".to_string(),
            )),
            None => Ok(RemoteStatus::Running {
                percent: 1,
                message: "still working".to_string(),
            }),
        }
    }

    async fn fetch_result(&self, _service: Service, job_id: &str) -> Result<Value, GatewayError> {
        let route = Route::from_job_id(job_id)
            .ok_or_else(|| GatewayError::Decode(format!("unknown job {}", job_id)))?;
        self.scripts
            .lock()
            .unwrap()
            .get(&route)
            .and_then(|script| script.result.clone())
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                message: "no result".to_string(),
            })
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_secs(2),
        time_budget: Duration::from_secs(600),
        ..Default::default()
    }
}

pub fn orchestrator(gateway: &Arc<FakeGateway>) -> Orchestrator {
    orchestrator_with(gateway, test_config())
}

pub fn orchestrator_with(gateway: &Arc<FakeGateway>, config: OrchestratorConfig) -> Orchestrator {
    let gateway: Arc<dyn JobGateway> = gateway.clone();
    Orchestrator::new(gateway, config)
}

pub const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const DIRECT_URL: &str = "https://cdn.example.com/lectures/week1.mp4";

pub fn transcript(lines: &[(f64, f64, &str)]) -> Value {
    let segments: Vec<Value> = lines
        .iter()
        .map(|(start, end, text)| json!({"start": start, "end": end, "text": text}))
        .collect();
    json!({ "transcript": segments })
}

pub fn empty_srt() -> Value {
    json!({"subtitle": "", "format": "srt", "mode": "official"})
}

pub fn full_analysis() -> Value {
    json!({
        "audio": {"segments": [{"start": 0.0, "end": 9.0, "text": "ignored audio track"}]},
        "visual": {"frames": [
            {"timestamp": 0.0, "texts": ["Lecture 1"]},
            {"timestamp": 2.0, "texts": ["Derivatives", "f'(x)"]}
        ]},
        "scenes": [
            {"timestamp": 0.0, "description": "Title card"},
            {"timestamp": 4.0, "description": "Lecturer writes on a blackboard"}
        ],
        "glossary": [
            {"term": "导数", "definition": "derivative", "context": "f'(x)"}
        ],
        "summary": "Introduces derivatives.",
        "fullDescription": "A lecturer explains the derivative with examples."
    })
}
