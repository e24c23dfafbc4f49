//! Readiness probes for the job services.

use std::{fmt, time::Duration};

use reqwest::{Client, Url};
use serde_json::Value;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceReadiness {
    Ready,
    /// Reachable but not reporting healthy.
    Unhealthy { status: String },
    Unreachable { reason: String },
}

impl ServiceReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceReadiness::Ready)
    }
}

impl fmt::Display for ServiceReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceReadiness::Ready => f.write_str("ready"),
            ServiceReadiness::Unhealthy { status } => write!(f, "unhealthy ({})", status),
            ServiceReadiness::Unreachable { reason } => write!(f, "unreachable ({})", reason),
        }
    }
}

/// `/health` on the origin of a service base URL.
pub fn health_url(base: &str) -> Option<Url> {
    let base = Url::parse(base).ok()?;
    base.join("/health").ok()
}

pub async fn check_service(client: &Client, base: &str) -> ServiceReadiness {
    let Some(url) = health_url(base) else {
        return ServiceReadiness::Unreachable {
            reason: format!("invalid base URL '{}'", base),
        };
    };

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            return ServiceReadiness::Unreachable {
                reason: e.to_string(),
            };
        }
    };

    let status = response.status();
    if !status.is_success() {
        return ServiceReadiness::Unhealthy {
            status: format!("HTTP {}", status.as_u16()),
        };
    }

    // a bare 200 counts; a body naming another status does not
    match response.json::<Value>().await {
        Ok(body) => readiness_from_body(&body),
        Err(_) => ServiceReadiness::Ready,
    }
}

fn readiness_from_body(body: &Value) -> ServiceReadiness {
    match body.get("status").and_then(Value::as_str) {
        None => ServiceReadiness::Ready,
        Some(s) if matches!(s.to_ascii_lowercase().as_str(), "ok" | "healthy" | "ready") => {
            ServiceReadiness::Ready
        }
        Some(s) => ServiceReadiness::Unhealthy {
            status: s.to_string(),
        },
    }
}

/// Probe every `interval` until ready or `timeout` passes; returns the last
/// readiness observed.
pub async fn wait_until_ready(
    client: &Client,
    base: &str,
    interval: Duration,
    timeout: Duration,
) -> ServiceReadiness {
    let deadline = Instant::now() + timeout;
    loop {
        let readiness = check_service(client, base).await;
        if readiness.is_ready() {
            return readiness;
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(base, %readiness, "service not ready before deadline");
            return readiness;
        }
        time::sleep(interval.min(deadline - now)).await;
    }
}
