//! Picks the backend and model a chat or workflow run talks to

use super::client::LLMBackend;
use super::detector::BackendDetector;
use super::error::BackendError;
use super::mock::MockBackend;
use crate::config::{BackendPreference, LmappConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SelectedBackend {
    pub backend: Arc<dyn LLMBackend>,
    pub model: String,
    pub description: String,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("backend", &self.backend.backend_name())
            .field("model", &self.model)
            .finish()
    }
}

/// Resolution rules for a running backend
///
/// An explicitly configured backend must pass a health check. In auto mode the
/// first running candidate wins. The mock backend is used only when
/// `allow_mock_fallback` is set.
pub struct BackendSelector {
    detector: BackendDetector,
    fixed: Option<Arc<dyn LLMBackend>>,
    model: Option<String>,
    allow_mock_fallback: bool,
}

impl BackendSelector {
    pub fn new(detector: BackendDetector) -> Self {
        Self {
            detector,
            fixed: None,
            model: None,
            allow_mock_fallback: false,
        }
    }

    pub fn from_config(config: &LmappConfig) -> Self {
        let selector = Self::new(config.create_detector()).with_model(config.model.clone());
        match config.backend {
            BackendPreference::Auto => selector,
            BackendPreference::Fixed(kind) => selector.with_backend(kind.create(config)),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn LLMBackend>) -> Self {
        self.fixed = Some(backend);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_mock_fallback(mut self, allow: bool) -> Self {
        self.allow_mock_fallback = allow;
        self
    }

    pub async fn select(&self) -> Result<SelectedBackend, BackendError> {
        let backend = match &self.fixed {
            Some(backend) => match self.check_fixed(backend).await {
                Ok(()) => Arc::clone(backend),
                Err(e) => self.mock_or(e)?,
            },
            None => match self.detector.first_running().await {
                Some(backend) => backend,
                None => self.mock_or(BackendError::Unavailable {
                    message: "no backend is running. Run `lmapp install` or start Ollama/llamafile"
                        .to_string(),
                })?,
            },
        };

        let model = self.choose_model(backend.as_ref()).await?;
        let description = format!("{} ({})", backend.display_name(), model);
        info!("Using backend: {}", description);

        Ok(SelectedBackend {
            backend,
            model,
            description,
        })
    }

    async fn check_fixed(&self, backend: &Arc<dyn LLMBackend>) -> Result<(), BackendError> {
        match backend.health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BackendError::NotRunning {
                backend: backend.backend_name().to_string(),
            }),
            Err(e) => {
                debug!("Health check for {} failed: {}", backend.backend_name(), e);
                Err(e)
            }
        }
    }

    fn mock_or(&self, err: BackendError) -> Result<Arc<dyn LLMBackend>, BackendError> {
        if self.allow_mock_fallback {
            warn!("{}; falling back to mock backend", err);
            Ok(Arc::new(MockBackend::running()))
        } else {
            Err(err)
        }
    }

    async fn choose_model(&self, backend: &dyn LLMBackend) -> Result<String, BackendError> {
        let models = backend.list_models().await;

        if let Some(model) = &self.model {
            if backend.backend_name() == "mock" {
                return Ok(model.clone());
            }
            return match_listed(&models, model).ok_or_else(|| BackendError::ModelNotFound {
                model: model.clone(),
            });
        }

        models
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Unavailable {
                message: format!(
                    "{} has no models. Run `lmapp install` to download one",
                    backend.display_name()
                ),
            })
    }
}

/// Resolves `wanted` against listed names, accepting an untagged name for `name:tag`
fn match_listed(models: &[String], wanted: &str) -> Option<String> {
    let tagged = format!("{}:", wanted);
    models
        .iter()
        .find(|m| m.as_str() == wanted)
        .or_else(|| models.iter().find(|m| m.starts_with(&tagged)))
        .cloned()
}
