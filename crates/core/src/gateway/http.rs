use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::Value;

use crate::config::OrchestratorConfig;

use super::{GatewayError, JobGateway, JobRequest, RemoteStatus, Service, wire};

/// reqwest-backed gateway speaking JSON to both job services.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    subtitle_url: Url,
    analysis_url: Url,
}

impl HttpGateway {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &OrchestratorConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            client,
            subtitle_url: parse_base(&config.subtitle_service_url)?,
            analysis_url: parse_base(&config.analysis_service_url)?,
        })
    }

    /// `<base>/jobs` followed by `segments`, each escaped as one path segment.
    fn jobs_url(&self, service: Service, segments: &[&str]) -> Url {
        let mut url = match service {
            Service::Subtitle => self.subtitle_url.clone(),
            Service::Analysis => self.analysis_url.clone(),
        };
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("jobs").extend(segments);
        }
        url
    }

    async fn read_json(response: Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            // error envelopes still carry the most useful message
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobGateway for HttpGateway {
    async fn create_job(
        &self,
        service: Service,
        request: &JobRequest,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.jobs_url(service, &[]))
            .json(request)
            .send()
            .await?;

        let job_id = wire::parse_created(Self::read_json(response).await?)?;
        tracing::debug!(%service, job_id = %job_id, "remote job created");
        Ok(job_id)
    }

    async fn job_status(
        &self,
        service: Service,
        job_id: &str,
    ) -> Result<RemoteStatus, GatewayError> {
        let response = self
            .client
            .get(self.jobs_url(service, &[job_id]))
            .send()
            .await?;

        wire::parse_status(Self::read_json(response).await?)
    }

    async fn fetch_result(&self, service: Service, job_id: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(self.jobs_url(service, &[job_id, "result"]))
            .send()
            .await?;

        wire::parse_result(Self::read_json(response).await?)
    }
}

fn parse_base(base: &str) -> Result<Url, GatewayError> {
    Url::parse(base)
        .ok()
        .filter(|url| !url.cannot_be_a_base())
        .ok_or_else(|| GatewayError::InvalidUrl(base.to_string()))
}
