//! Deterministic test double
//!
//! Always installed, keeps its running state in memory and answers every chat
//! with an echo of the prompt. Lets the workflow engine and CLI run without any
//! inference runtime present.

use super::client::LLMBackend;
use super::error::BackendError;
use super::types::{ChatRequest, ProgressCallback};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const MOCK_VERSION: &str = "1.0.0-mock";

pub struct MockBackend {
    running: AtomicBool,
    models: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            models: Mutex::new(vec![
                "mock-model".to_string(),
                "mock-7b".to_string(),
                "mock-13b".to_string(),
            ]),
        }
    }

    /// A mock that reports itself as already running
    pub fn running() -> Self {
        let backend = Self::new();
        backend.running.store(true, Ordering::SeqCst);
        backend
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMBackend for MockBackend {
    fn backend_name(&self) -> &str {
        "mock"
    }

    fn display_name(&self) -> &str {
        "Mock (Testing)"
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
        self.running.store(true, Ordering::SeqCst);
        true
    }

    async fn stop(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        true
    }

    async fn get_version(&self) -> Option<String> {
        Some(MOCK_VERSION.to_string())
    }

    async fn list_models(&self) -> Vec<String> {
        self.models.lock().map(|m| m.clone()).unwrap_or_default()
    }

    async fn download_model(&self, name: &str, progress: Option<ProgressCallback<'_>>) -> bool {
        if let Some(cb) = progress {
            cb(&format!("Downloading {}...", name));
            cb("Model downloaded!");
        }
        if let Ok(mut models) = self.models.lock() {
            if !models.iter().any(|m| m == name) {
                models.push(name.to_string());
            }
        }
        true
    }

    async fn remove_model(&self, name: &str) -> bool {
        match self.models.lock() {
            Ok(mut models) => {
                let before = models.len();
                models.retain(|m| m != name);
                models.len() != before
            }
            Err(_) => false,
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError> {
        Ok(format!("Mock response. You asked: {}", request.prompt))
    }
}
