use super::error::BackendError;
use super::types::{BackendInfo, BackendStatus, ChatRequest, ProgressCallback, TokenCallback};
use async_trait::async_trait;

/// Capability contract every local inference provider satisfies
///
/// Lifecycle methods report success as `bool`; generation methods return typed
/// errors so callers can tell transient failures from definitional ones.
#[async_trait]
pub trait LLMBackend: Send + Sync {
    /// Stable lowercase identifier (e.g. "ollama")
    fn backend_name(&self) -> &str;

    /// Human-readable name for status tables
    fn display_name(&self) -> &str;

    async fn is_installed(&self) -> bool;

    /// Single, quick liveness probe
    async fn is_running(&self) -> bool;

    async fn install(&self) -> bool;

    async fn start(&self) -> bool;

    async fn stop(&self) -> bool;

    async fn get_version(&self) -> Option<String>;

    /// Liveness probe that retries transient failures
    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(self.is_running().await)
    }

    async fn get_info(&self) -> BackendInfo {
        let status = if self.is_running().await {
            BackendStatus::Running
        } else if self.is_installed().await {
            BackendStatus::Installed
        } else {
            BackendStatus::NotInstalled
        };

        let version = if status == BackendStatus::NotInstalled {
            None
        } else {
            self.get_version().await
        };

        BackendInfo {
            name: self.backend_name().to_string(),
            display_name: self.display_name().to_string(),
            version,
            status,
        }
    }

    async fn list_models(&self) -> Vec<String>;

    async fn download_model(&self, name: &str, progress: Option<ProgressCallback<'_>>) -> bool;

    async fn remove_model(&self, name: &str) -> bool;

    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Streams generated text to `on_token`, returning the full completion
    async fn stream_chat(
        &self,
        _request: &ChatRequest,
        _on_token: TokenCallback<'_>,
    ) -> Result<String, BackendError> {
        Err(BackendError::StreamingUnsupported {
            backend: self.backend_name().to_string(),
        })
    }
}
