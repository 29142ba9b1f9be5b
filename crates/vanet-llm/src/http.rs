use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vanet_core::backend::{InstructionBackend, InstructionRequest};
use vanet_core::cluster::EventCluster;
use vanet_core::errors::BackendError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection details for [`HttpBackend`].
#[derive(Debug)]
pub struct HttpBackendConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    model: &'a str,
    cluster: &'a EventCluster,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateReply {
    instruction: String,
}

/// Text-generation service reached over HTTP with a JSON request/response.
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        if config.endpoint.trim().is_empty() {
            return Err(BackendError::NotConfigured("endpoint is empty".into()));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::NotConfigured(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, request: &InstructionRequest) -> reqwest::RequestBuilder {
        let body = GenerateBody {
            model: &self.config.model,
            cluster: &request.cluster,
            context_hint: request.context_hint.as_deref(),
        };
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .header("accept", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        req
    }
}

#[async_trait]
impl InstructionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip_all, fields(model = %self.config.model, cluster = %request.cluster.key()))]
    async fn generate(&self, request: &InstructionRequest) -> Result<String, BackendError> {
        let resp = self.build_request(request).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.config.timeout)
            } else {
                BackendError::NetworkError(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            return Err(match BackendError::from_status(status, body) {
                BackendError::RateLimited { .. } => BackendError::RateLimited { retry_after },
                other => other,
            });
        }

        let reply: GenerateReply = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(reply.instruction)
    }
}
