//! Backend access for LLM-backed actions
//!
//! The backend is resolved on first use and reused for the lifetime of the
//! adapter. Each run owns its adapter; nothing is shared globally.

use crate::backend::{BackendError, BackendSelector, ChatRequest, SelectedBackend};
use tokio::sync::OnceCell;
use tracing::debug;

pub struct WorkflowLlm {
    selector: BackendSelector,
    temperature: f32,
    selected: OnceCell<SelectedBackend>,
}

impl WorkflowLlm {
    pub fn new(selector: BackendSelector) -> Self {
        Self {
            selector,
            temperature: ChatRequest::DEFAULT_TEMPERATURE,
            selected: OnceCell::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn selected(&self) -> Result<&SelectedBackend, BackendError> {
        self.selected
            .get_or_try_init(|| async {
                debug!("Resolving backend for workflow actions");
                self.selector.select().await
            })
            .await
    }

    /// Description of the resolved backend, resolving it if needed
    pub async fn describe(&self) -> Result<String, BackendError> {
        Ok(self.selected().await?.description.clone())
    }

    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, BackendError> {
        let selected = self.selected().await?;
        let mut request =
            ChatRequest::new(prompt, selected.model.clone()).with_temperature(self.temperature);
        if let Some(system) = system_prompt {
            request = request.with_system_prompt(system);
        }
        selected.backend.chat(&request).await
    }
}
