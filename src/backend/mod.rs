pub mod decoder;
pub mod nexus;
pub(crate) mod utils;

pub use decoder::{StreamDecoder, decode_line};
pub use nexus::{Nexus, NexusError};

#[cfg(test)]
use mockall::automock;

use crate::config::BackendConfig;
use crate::models::{ChatRequest, HealthStatus, Model, SystemMetrics, UploadResult};
use async_trait::async_trait;
use eyre::Result;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Raw body of a streaming chat response, chunk by chunk as the transport
/// delivers it.
pub type ChatStream = BoxStream<'static, Result<Vec<u8>>>;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait Backend {
    async fn list_models(&self) -> Result<Vec<Model>>;
    async fn health(&self) -> Result<HealthStatus>;
    async fn metrics(&self) -> Result<SystemMetrics>;
    /// Resolves once the response headers arrived; the body is streamed.
    async fn chat(&self, request: ChatRequest) -> Result<ChatStream>;
    /// Drops the server-side conversation context.
    async fn reset(&self) -> Result<()>;
    async fn upload(&self, filename: String, content: Vec<u8>) -> Result<UploadResult>;
    async fn export_pdf(&self, conversation_id: String) -> Result<Vec<u8>>;
}

pub type ArcBackend = Arc<dyn Backend + Send + Sync>;

pub fn new_backend(config: &BackendConfig) -> ArcBackend {
    Arc::new(Nexus::from(config))
}
