#[cfg(test)]
#[path = "nexus_test.rs"]
mod tests;

use crate::backend::utils::{endpoint_url, error_message};
use crate::backend::{ArcBackend, Backend, ChatStream};
use crate::config::{BackendConfig, user_agent};
use crate::models::{ChatRequest, HealthStatus, Model, SystemMetrics, UploadResult};
use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use futures::TryStreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time;
use thiserror::Error;

/// HTTP client for the NEXUS agent API.
pub struct Nexus {
    endpoint: String,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[async_trait]
impl Backend for Nexus {
    async fn list_models(&self) -> Result<Vec<Model>> {
        let res = self
            .request(reqwest::Method::GET, &["models"])?
            .send()
            .await
            .wrap_err("listing models")?;

        let res = check_status(res).await?;
        let res = res
            .json::<ModelListResponse>()
            .await
            .wrap_err("parsing model list response")?;
        Ok(res.models)
    }

    async fn health(&self) -> Result<HealthStatus> {
        let res = self
            .request(reqwest::Method::GET, &["health"])?
            .send()
            .await
            .wrap_err("checking health")?;

        check_status(res)
            .await?
            .json::<HealthStatus>()
            .await
            .wrap_err("parsing health response")
    }

    async fn metrics(&self) -> Result<SystemMetrics> {
        let res = self
            .request(reqwest::Method::GET, &["metrics"])?
            .send()
            .await
            .wrap_err("fetching metrics")?;

        let res = check_status(res)
            .await?
            .json::<MetricsResponse>()
            .await
            .wrap_err("parsing metrics response")?;
        res.try_into()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = endpoint_url(&self.endpoint, &["chat"])?;
        log::trace!("Sending chat request: {:?}", request);

        // No overall timeout here: the body may legitimately stream for
        // minutes. The caller bounds the gap between chunks instead.
        let res = self
            .client
            .post(url)
            .header("User-Agent", user_agent())
            .json(&request)
            .send()
            .await
            .wrap_err("sending chat request")?;

        let res = check_status(res).await?;
        let stream = res
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|e| eyre::Report::new(e).wrap_err("reading chat stream"));
        Ok(Box::pin(stream))
    }

    async fn reset(&self) -> Result<()> {
        let res = self
            .request(reqwest::Method::POST, &["reset"])?
            .send()
            .await
            .wrap_err("resetting conversation")?;
        check_status(res).await?;
        Ok(())
    }

    async fn upload(&self, filename: String, content: Vec<u8>) -> Result<UploadResult> {
        let part = reqwest::multipart::Part::bytes(content).file_name(filename.clone());
        let form = reqwest::multipart::Form::new().part("file", part);

        let res = self
            .request(reqwest::Method::POST, &["upload"])?
            .multipart(form)
            .send()
            .await
            .wrap_err(format!("uploading {}", filename))?;

        // Rejected uploads come back as 400 with the same JSON shape.
        let status = res.status();
        let body = res.text().await.wrap_err("reading upload response")?;
        match serde_json::from_str::<UploadResult>(&body) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => Err(NexusError::Status {
                code: status.as_u16(),
                message: error_message(&body),
            }
            .into()),
            Err(err) => Err(eyre::Report::new(err).wrap_err("parsing upload response")),
        }
    }

    async fn export_pdf(&self, conversation_id: String) -> Result<Vec<u8>> {
        let res = self
            .request(reqwest::Method::GET, &["export", "pdf", conversation_id.as_str()])?
            .send()
            .await
            .wrap_err(format!("exporting conversation {}", conversation_id))?;

        let bytes = check_status(res)
            .await?
            .bytes()
            .await
            .wrap_err("reading exported pdf")?;
        Ok(bytes.to_vec())
    }
}

impl From<Nexus> for ArcBackend {
    fn from(value: Nexus) -> Self {
        Arc::new(value)
    }
}

impl From<&BackendConfig> for Nexus {
    fn from(value: &BackendConfig) -> Self {
        let mut nexus = Nexus::default().with_endpoint(&value.endpoint);
        nexus.timeout = value.timeout();
        nexus
    }
}

impl Nexus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder> {
        let url = endpoint_url(&self.endpoint, segments)?;
        let mut req = self
            .client
            .request(method, url)
            .header("User-Agent", user_agent());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        Ok(req)
    }
}

impl Default for Nexus {
    fn default() -> Self {
        Self {
            endpoint: crate::config::constants::DEFAULT_ENDPOINT.to_string(),
            timeout: None,
            client: reqwest::Client::new(),
        }
    }
}

/// Turns a non-2xx response into a [`NexusError::Status`].
pub(crate) async fn check_status(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    log::error!("Error response ({}): {}", status, body);
    Err(NexusError::Status {
        code: status.as_u16(),
        message: error_message(&body),
    }
    .into())
}

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("NEXUS error ({code}): {message}")]
    Status { code: u16, message: String },
}

impl NexusError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, NexusError::Status { code: 404, .. })
    }
}

#[derive(Default, Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    models: Vec<Model>,
}

#[derive(Default, Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    system: SystemResponse,
}

#[derive(Default, Debug, Deserialize)]
struct SystemResponse {
    cpu: Option<CpuResponse>,
    memory: Option<UsageResponse>,
    disk: Option<UsageResponse>,
    error: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
struct CpuResponse {
    #[serde(default)]
    usage_percent: f64,
    count: Option<u32>,
}

#[derive(Default, Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    percent: f64,
}

impl TryFrom<MetricsResponse> for SystemMetrics {
    type Error = eyre::Report;

    fn try_from(value: MetricsResponse) -> Result<Self> {
        let system = value.system;
        let (Some(cpu), Some(memory)) = (system.cpu, system.memory) else {
            return Err(eyre!(
                "metrics unavailable: {}",
                system.error.as_deref().unwrap_or("missing cpu or memory")
            ));
        };

        Ok(SystemMetrics {
            cpu_percent: cpu.usage_percent,
            cpu_count: cpu.count,
            memory_percent: memory.percent,
            disk_percent: system.disk.map(|d| d.percent),
        })
    }
}
