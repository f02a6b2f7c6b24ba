//! Installation wizard
//!
//! Three sequential steps: system check, backend install, default model
//! download. A failed system check aborts before anything is installed; a
//! failed model download leaves the backend installed but without a model.

use super::client::LLMBackend;
use super::detector::BackendDetector;
use super::models::{DefaultModel, ModelCatalog};
use super::system::SystemReport;
use super::types::ProgressCallback;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("System check failed: {}", failures.join("; "))]
    SystemCheck { failures: Vec<String> },

    #[error("Unknown backend '{name}'")]
    UnknownBackend { name: String },

    #[error("Installation of {backend} was cancelled")]
    Cancelled { backend: String },

    #[error("Installation of {backend} failed")]
    BackendFailed { backend: String },
}

/// Asks the user to confirm a step
pub trait InstallPrompt: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Non-interactive prompt that accepts everything
pub struct AssumeYes;

impl InstallPrompt for AssumeYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

/// Result of a completed wizard run
#[derive(Debug, Clone, PartialEq)]
pub struct InstallOutcome {
    pub backend: String,
    /// `None` when the model step failed or was skipped
    pub model: Option<String>,
    /// Whether the backend server answered at the end of the wizard
    pub running: bool,
}

pub struct BackendInstaller {
    detector: Arc<BackendDetector>,
    prompt: Box<dyn InstallPrompt>,
}

impl BackendInstaller {
    pub fn new(detector: Arc<BackendDetector>, prompt: Box<dyn InstallPrompt>) -> Self {
        Self { detector, prompt }
    }

    /// Step 1: turns a measured report into a go/no-go decision
    pub fn check_system(&self, report: &SystemReport) -> Result<(), InstallError> {
        let failures = report.failures();
        if failures.is_empty() {
            info!("System checks passed");
            Ok(())
        } else {
            error!("System checks failed: {:?}", failures);
            Err(InstallError::SystemCheck { failures })
        }
    }

    /// Step 2: installs the chosen (or recommended) backend
    ///
    /// Returns `None` on failure or cancellation.
    pub async fn install_backend(
        &self,
        choice: Option<&str>,
        ram_gb: f64,
    ) -> Option<Arc<dyn LLMBackend>> {
        match self.try_install_backend(choice, ram_gb).await {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn try_install_backend(
        &self,
        choice: Option<&str>,
        ram_gb: f64,
    ) -> Result<Arc<dyn LLMBackend>, InstallError> {
        let backend = match choice {
            Some(name) => self
                .detector
                .get_backend_by_name(name)
                .ok_or_else(|| InstallError::UnknownBackend {
                    name: name.to_string(),
                })?,
            None => self.detector.recommend(ram_gb).await.ok_or_else(|| {
                InstallError::UnknownBackend {
                    name: "<none>".to_string(),
                }
            })?,
        };
        let name = backend.display_name().to_string();

        if backend.is_installed().await {
            info!("{} is already installed", name);
            return Ok(backend);
        }

        if !self.prompt.confirm(&format!("Install {}?", name)) {
            return Err(InstallError::Cancelled { backend: name });
        }

        info!("Installing {}", name);
        if backend.install().await {
            info!("{} installed", name);
            Ok(backend)
        } else {
            Err(InstallError::BackendFailed { backend: name })
        }
    }

    /// Step 3: downloads a default model sized for `ram_gb`
    pub async fn install_model(
        &self,
        backend: &dyn LLMBackend,
        ram_gb: f64,
        progress: Option<ProgressCallback<'_>>,
    ) -> bool {
        let model = ModelCatalog::for_ram(ram_gb);
        let name = model_name_for(backend, model);

        if backend
            .list_models()
            .await
            .iter()
            .any(|m| m == name || m.starts_with(&format!("{}:", name)))
        {
            info!("Model {} already available in {}", name, backend.display_name());
            return true;
        }

        if !self
            .prompt
            .confirm(&format!("Download {} ({} params)?", model.display_name, model.params))
        {
            info!("Model download skipped by user");
            return false;
        }

        // Service-managed backends pull through their server; process-managed
        // ones can only start once a model is on disk.
        if !backend.is_running().await && !backend.start().await {
            debug!(
                "{} did not start before download; starting again once the model is present",
                backend.display_name()
            );
        }

        backend.download_model(name, progress).await
    }

    /// Starts the backend server unless it already answers
    pub async fn start_backend(&self, backend: &dyn LLMBackend) -> bool {
        if backend.is_running().await {
            return true;
        }
        info!("Starting {}", backend.display_name());
        if backend.start().await {
            true
        } else {
            error!("{} is installed but failed to start", backend.display_name());
            false
        }
    }

    /// Runs all three steps
    pub async fn run_wizard(
        &self,
        report: &SystemReport,
        choice: Option<&str>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<InstallOutcome, InstallError> {
        self.check_system(report)?;

        let ram_gb = report.ram_gb();
        let backend = self.try_install_backend(choice, ram_gb).await?;

        let model = if self.install_model(backend.as_ref(), ram_gb, progress).await {
            Some(model_name_for(backend.as_ref(), ModelCatalog::for_ram(ram_gb)).to_string())
        } else {
            warn!("Backend installed but model download skipped or failed");
            None
        };

        let running = self.start_backend(backend.as_ref()).await;

        Ok(InstallOutcome {
            backend: backend.backend_name().to_string(),
            model,
            running,
        })
    }
}

/// Ollama pulls by tag; every other backend uses the short name
fn model_name_for(backend: &dyn LLMBackend, model: &'static DefaultModel) -> &'static str {
    if backend.backend_name() == "ollama" {
        model.ollama_tag
    } else {
        model.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BackendError;
    use crate::backend::mock::MockBackend;
    use crate::backend::types::ChatRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Process-managed stand-in: the server only starts with a model on disk
    struct NeedsModel {
        models: Mutex<Vec<String>>,
        running: AtomicBool,
        broken: bool,
    }

    impl NeedsModel {
        fn new(models: &[&str], broken: bool) -> Self {
            Self {
                models: Mutex::new(models.iter().map(|m| m.to_string()).collect()),
                running: AtomicBool::new(false),
                broken,
            }
        }
    }

    #[async_trait]
    impl LLMBackend for NeedsModel {
        fn backend_name(&self) -> &str {
            "llamafile"
        }
        fn display_name(&self) -> &str {
            "llamafile"
        }
        async fn is_installed(&self) -> bool {
            true
        }
        async fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
        async fn install(&self) -> bool {
            true
        }
        async fn start(&self) -> bool {
            if self.broken || self.models.lock().unwrap().is_empty() {
                return false;
            }
            self.running.store(true, Ordering::SeqCst);
            true
        }
        async fn stop(&self) -> bool {
            self.running.store(false, Ordering::SeqCst);
            true
        }
        async fn get_version(&self) -> Option<String> {
            None
        }
        async fn list_models(&self) -> Vec<String> {
            self.models.lock().unwrap().clone()
        }
        async fn download_model(&self, name: &str, _: Option<ProgressCallback<'_>>) -> bool {
            self.models.lock().unwrap().push(name.to_string());
            true
        }
        async fn remove_model(&self, _: &str) -> bool {
            true
        }
        async fn chat(&self, _: &ChatRequest) -> Result<String, BackendError> {
            Ok(String::new())
        }
    }

    fn installer_for(backend: Arc<NeedsModel>) -> BackendInstaller {
        let backend: Arc<dyn LLMBackend> = backend;
        let detector = BackendDetector::new(vec![backend]);
        BackendInstaller::new(Arc::new(detector), Box::new(AssumeYes))
    }

    struct Decline;

    impl InstallPrompt for Decline {
        fn confirm(&self, _question: &str) -> bool {
            false
        }
    }

    fn report(ram_gb: f64) -> SystemReport {
        SystemReport {
            os_name: "TestOS".to_string(),
            os_supported: true,
            total_ram_bytes: (ram_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            available_ram_bytes: 0,
            free_disk_bytes: None,
            cpu_cores: 2,
        }
    }

    fn installer(prompt: Box<dyn InstallPrompt>) -> BackendInstaller {
        let detector = BackendDetector::new(vec![Arc::new(MockBackend::new())]);
        BackendInstaller::new(Arc::new(detector), prompt)
    }

    #[tokio::test]
    async fn test_system_check_failure_aborts() {
        let err = installer(Box::new(AssumeYes))
            .run_wizard(&report(1.0), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::SystemCheck { .. }));
    }

    #[tokio::test]
    async fn test_full_wizard_with_mock() {
        let outcome = installer(Box::new(AssumeYes))
            .run_wizard(&report(4.0), Some("mock"), None)
            .await
            .unwrap();
        assert_eq!(outcome.backend, "mock");
        assert_eq!(outcome.model.as_deref(), Some("phi3"));
    }

    #[tokio::test]
    async fn test_declined_model_is_non_fatal() {
        let outcome = installer(Box::new(Decline))
            .run_wizard(&report(16.0), None, None)
            .await
            .unwrap();
        assert_eq!(outcome.backend, "mock");
        assert_eq!(outcome.model, None);
    }

    #[tokio::test]
    async fn test_unknown_backend_choice() {
        let installer = installer(Box::new(AssumeYes));
        assert!(installer.install_backend(Some("vllm"), 16.0).await.is_none());
        let err = installer
            .run_wizard(&report(16.0), Some("vllm"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::UnknownBackend { .. }));
    }

    #[tokio::test]
    async fn test_install_model_reports_progress() {
        let installer = installer(Box::new(AssumeYes));
        let backend = MockBackend::new();
        let mut lines = Vec::new();
        let mut record = |line: &str| lines.push(line.to_string());
        assert!(installer.install_model(&backend, 2.0, Some(&mut record)).await);
        assert!(lines.iter().any(|l| l.contains("tinyllama")));
    }

    #[tokio::test]
    async fn test_fresh_install_starts_server_after_download() {
        let backend = Arc::new(NeedsModel::new(&[], false));
        let outcome = installer_for(Arc::clone(&backend))
            .run_wizard(&report(4.0), Some("llamafile"), None)
            .await
            .unwrap();

        assert_eq!(outcome.model.as_deref(), Some("phi3"));
        assert!(outcome.running);
        assert!(backend.is_running().await);
    }

    #[tokio::test]
    async fn test_repeat_install_starts_stopped_server() {
        let backend = Arc::new(NeedsModel::new(&["phi3"], false));
        let outcome = installer_for(Arc::clone(&backend))
            .run_wizard(&report(4.0), Some("llamafile"), None)
            .await
            .unwrap();

        assert_eq!(outcome.model.as_deref(), Some("phi3"));
        assert!(outcome.running);
        assert_eq!(backend.list_models().await, vec!["phi3"]);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let backend = Arc::new(NeedsModel::new(&[], true));
        let outcome = installer_for(Arc::clone(&backend))
            .run_wizard(&report(4.0), Some("llamafile"), None)
            .await
            .unwrap();

        assert_eq!(outcome.model.as_deref(), Some("phi3"));
        assert!(!outcome.running);
    }
}
