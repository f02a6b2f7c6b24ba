//! Backend detection and recommendation

use super::client::LLMBackend;
use super::llamafile::LlamafileBackend;
use super::mock::MockBackend;
use super::ollama::OllamaBackend;
use super::types::{BackendInfo, BackendKind};
use crate::config::LmappConfig;
use std::sync::Arc;
use tracing::{debug, info};

/// RAM (in GB) at or above which the first-priority provider is recommended
pub const PRIMARY_RAM_THRESHOLD_GB: f64 = 8.0;

/// Tie-break policy for a fresh install
///
/// The first-priority provider wins when it is already installed or when there
/// is enough RAM for it; otherwise the lower-resource provider is chosen.
pub fn recommend_kind(primary_installed: bool, ram_gb: f64) -> BackendKind {
    if primary_installed || ram_gb >= PRIMARY_RAM_THRESHOLD_GB {
        BackendKind::Ollama
    } else {
        BackendKind::Llamafile
    }
}

impl BackendKind {
    /// Builds the variant with endpoints, timeouts and retries taken from `config`
    pub fn create(self, config: &LmappConfig) -> Arc<dyn LLMBackend> {
        match self {
            BackendKind::Ollama => Arc::new(OllamaBackend::with_options(
                config.ollama_host.clone(),
                config.request_timeout(),
                config.recovery_policy(),
            )),
            BackendKind::Llamafile => Arc::new(LlamafileBackend::with_options(
                config.data_dir.join("llamafile"),
                config.llamafile_port,
                config.request_timeout(),
                config.recovery_policy(),
            )),
            BackendKind::Mock => Arc::new(MockBackend::running()),
        }
    }
}

/// Enumerates a fixed, ordered candidate list of backends
///
/// Candidate order defines precedence: index 0 is the first-priority provider,
/// index 1 the lower-resource one.
pub struct BackendDetector {
    candidates: Vec<Arc<dyn LLMBackend>>,
}

impl BackendDetector {
    pub fn new(candidates: Vec<Arc<dyn LLMBackend>>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[Arc<dyn LLMBackend>] {
        &self.candidates
    }

    /// Candidates that report themselves installed, in precedence order
    pub async fn detect_all(&self) -> Vec<Arc<dyn LLMBackend>> {
        let mut installed = Vec::new();
        for backend in &self.candidates {
            let is_installed = backend.is_installed().await;
            debug!("{} installed: {}", backend.backend_name(), is_installed);
            if is_installed {
                installed.push(Arc::clone(backend));
            }
        }
        installed
    }

    /// First installed candidate whose server answers
    pub async fn first_running(&self) -> Option<Arc<dyn LLMBackend>> {
        for backend in self.detect_all().await {
            if backend.is_running().await {
                return Some(backend);
            }
        }
        None
    }

    /// Recommends a candidate for a machine with `ram_gb` of memory
    ///
    /// Returns `None` only when the candidate list is empty.
    pub async fn recommend(&self, ram_gb: f64) -> Option<Arc<dyn LLMBackend>> {
        let primary = self.candidates.first()?;
        let primary_installed = primary.is_installed().await;

        let pick = if primary_installed {
            info!("{} already installed (recommended)", primary.display_name());
            primary
        } else if ram_gb >= PRIMARY_RAM_THRESHOLD_GB {
            info!(
                "Recommending {} ({:.1}GB RAM >= {}GB)",
                primary.display_name(),
                ram_gb,
                PRIMARY_RAM_THRESHOLD_GB
            );
            primary
        } else {
            let fallback = self.candidates.get(1).unwrap_or(primary);
            info!(
                "Recommending {} (better for limited RAM: {:.1}GB)",
                fallback.display_name(),
                ram_gb
            );
            fallback
        };

        Some(Arc::clone(pick))
    }

    pub fn get_backend_by_name(&self, name: &str) -> Option<Arc<dyn LLMBackend>> {
        let needle = name.trim().to_lowercase();
        self.candidates
            .iter()
            .find(|b| b.backend_name() == needle)
            .cloned()
    }

    /// Fresh status snapshot for every candidate
    pub async fn status_rows(&self) -> Vec<BackendInfo> {
        let mut rows = Vec::with_capacity(self.candidates.len());
        for backend in &self.candidates {
            rows.push(backend.get_info().await);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BackendError;
    use crate::backend::types::{BackendStatus, ChatRequest, ProgressCallback};
    use async_trait::async_trait;

    struct StubBackend {
        name: &'static str,
        installed: bool,
        running: bool,
    }

    #[async_trait]
    impl LLMBackend for StubBackend {
        fn backend_name(&self) -> &str {
            self.name
        }
        fn display_name(&self) -> &str {
            self.name
        }
        async fn is_installed(&self) -> bool {
            self.installed
        }
        async fn is_running(&self) -> bool {
            self.running
        }
        async fn install(&self) -> bool {
            true
        }
        async fn start(&self) -> bool {
            true
        }
        async fn stop(&self) -> bool {
            true
        }
        async fn get_version(&self) -> Option<String> {
            Some("0.1.0".to_string())
        }
        async fn list_models(&self) -> Vec<String> {
            Vec::new()
        }
        async fn download_model(&self, _: &str, _: Option<ProgressCallback<'_>>) -> bool {
            true
        }
        async fn remove_model(&self, _: &str) -> bool {
            true
        }
        async fn chat(&self, _: &ChatRequest) -> Result<String, BackendError> {
            Ok(String::new())
        }
    }

    fn detector(primary_installed: bool, secondary_installed: bool) -> BackendDetector {
        BackendDetector::new(vec![
            Arc::new(StubBackend {
                name: "ollama",
                installed: primary_installed,
                running: false,
            }),
            Arc::new(StubBackend {
                name: "llamafile",
                installed: secondary_installed,
                running: secondary_installed,
            }),
        ])
    }

    #[test]
    fn test_recommend_kind_policy() {
        assert_eq!(recommend_kind(false, 8.0), BackendKind::Ollama);
        assert_eq!(recommend_kind(false, 2.0), BackendKind::Llamafile);
        assert_eq!(recommend_kind(true, 1.0), BackendKind::Ollama);
    }

    #[tokio::test]
    async fn test_recommend_primary_with_enough_ram() {
        let picked = detector(false, false).recommend(8.0).await.unwrap();
        assert_eq!(picked.backend_name(), "ollama");
    }

    #[tokio::test]
    async fn test_recommend_lower_resource_with_little_ram() {
        let picked = detector(false, false).recommend(2.0).await.unwrap();
        assert_eq!(picked.backend_name(), "llamafile");
    }

    #[tokio::test]
    async fn test_recommend_installed_primary_regardless_of_ram() {
        let picked = detector(true, true).recommend(1.0).await.unwrap();
        assert_eq!(picked.backend_name(), "ollama");
    }

    #[tokio::test]
    async fn test_recommend_empty_candidates() {
        assert!(BackendDetector::new(Vec::new()).recommend(16.0).await.is_none());
    }

    #[tokio::test]
    async fn test_detect_all_preserves_order() {
        let names: Vec<String> = detector(true, true)
            .detect_all()
            .await
            .iter()
            .map(|b| b.backend_name().to_string())
            .collect();
        assert_eq!(names, vec!["ollama", "llamafile"]);

        assert!(detector(false, false).detect_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_running_and_lookup() {
        let detector = detector(true, true);
        let running = detector.first_running().await.unwrap();
        assert_eq!(running.backend_name(), "llamafile");

        assert!(detector.get_backend_by_name("OLLAMA").is_some());
        assert!(detector.get_backend_by_name("vllm").is_none());
    }

    #[tokio::test]
    async fn test_recommend_follows_candidate_order_not_kind() {
        let detector = BackendDetector::new(vec![
            Arc::new(StubBackend {
                name: "llamafile",
                installed: false,
                running: false,
            }),
            Arc::new(StubBackend {
                name: "ollama",
                installed: false,
                running: false,
            }),
        ]);
        assert_eq!(detector.recommend(8.0).await.unwrap().backend_name(), "llamafile");
        assert_eq!(detector.recommend(4.0).await.unwrap().backend_name(), "ollama");
    }

    #[tokio::test]
    async fn test_configured_mock_is_ready_to_use() {
        let config = LmappConfig {
            model: None,
            ..LmappConfig::default()
        };
        let mock = BackendKind::Mock.create(&config);
        assert_eq!(mock.backend_name(), "mock");
        assert!(mock.is_running().await);
    }

    #[tokio::test]
    async fn test_status_rows() {
        let rows = detector(false, true).status_rows().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, BackendStatus::NotInstalled);
        assert_eq!(rows[0].version, None);
        assert_eq!(rows[1].status, BackendStatus::Running);
        assert_eq!(rows[1].version.as_deref(), Some("0.1.0"));
    }
}
