//! Ollama backend
//!
//! Wraps a locally running Ollama daemon. Installation and server lifecycle go
//! through the `ollama` binary; model management and generation go through the
//! daemon's HTTP API (`/api/tags`, `/api/pull`, `/api/generate`).

use super::client::LLMBackend;
use super::error::BackendError;
use super::process::{find_executable, parse_json_line, probe_version, run_shell, LineBuffer};
use super::recovery::RecoveryPolicy;
use super::types::{ChatRequest, ProgressCallback, TokenCallback};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const INSTALL_SCRIPT: &str = "curl -fsSL https://ollama.com/install.sh | sh";

pub struct OllamaBackend {
    endpoint: String,
    http_client: Client,
    timeout: Duration,
    policy: RecoveryPolicy,
    server: Mutex<Option<Child>>,
}

impl OllamaBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_options(
            endpoint,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            RecoveryPolicy::default(),
        )
    }

    /// Reads `OLLAMA_HOST`, falling back to the default local endpoint
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
        Self::new(endpoint)
    }

    pub fn with_options(endpoint: impl Into<String>, timeout: Duration, policy: RecoveryPolicy) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            endpoint: normalize_endpoint(endpoint.into()),
            http_client,
            timeout,
            policy,
            server: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn binary(&self) -> Option<PathBuf> {
        find_executable("ollama")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        let response = self
            .http_client
            .get(self.url("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, PROBE_TIMEOUT.as_secs()))?;
        Ok(response.status().is_success())
    }

    async fn wait_until_running(&self) -> bool {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while Instant::now() < deadline {
            if self.is_running().await {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        false
    }

    async fn send_generate(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let body = GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };

        debug!(
            "Sending request to Ollama: model={}, prompt_length={}, stream={}",
            request.model,
            request.prompt.len(),
            stream
        );

        let response = self
            .http_client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout.as_secs()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        error!("Ollama API returned error status {}: {}", status, text);

        if status == 404 && text.contains("model") {
            return Err(BackendError::ModelNotFound {
                model: request.model.clone(),
            });
        }
        Err(BackendError::Api {
            status,
            message: text,
        })
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let start = Instant::now();
        let response = self.send_generate(request, false).await?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            BackendError::InvalidResponse {
                message: format!("JSON parse error: {}", e),
            }
        })?;

        if !body.done {
            warn!("Ollama response indicates incomplete generation");
        }
        info!(
            "Ollama generation completed in {:.2}s (model={})",
            start.elapsed().as_secs_f64(),
            request.model
        );
        Ok(body.response)
    }
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[async_trait]
impl LLMBackend for OllamaBackend {
    fn backend_name(&self) -> &str {
        "ollama"
    }

    fn display_name(&self) -> &str {
        "Ollama"
    }

    async fn is_installed(&self) -> bool {
        self.binary().is_some() || self.is_running().await
    }

    async fn is_running(&self) -> bool {
        match self.probe().await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!("Ollama not reachable at {}: {}", self.endpoint, e);
                false
            }
        }
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        self.policy.run("ollama health check", || self.probe()).await
    }

    async fn install(&self) -> bool {
        if self.binary().is_some() {
            info!("Ollama already installed");
            return true;
        }

        let script = if cfg!(target_os = "linux") {
            INSTALL_SCRIPT
        } else if cfg!(target_os = "macos") && find_executable("brew").is_some() {
            "brew install ollama"
        } else {
            warn!("Automatic Ollama install is not supported on this platform; see https://ollama.com/download");
            return false;
        };

        info!("Installing Ollama: {}", script);
        match run_shell(script).await {
            Ok(true) => self.binary().is_some(),
            Ok(false) => {
                error!("Ollama installer exited with failure");
                false
            }
            Err(e) => {
                error!("Ollama installer failed: {}", e);
                false
            }
        }
    }

    async fn start(&self) -> bool {
        if self.is_running().await {
            return true;
        }
        let Some(binary) = self.binary() else {
            warn!("Cannot start Ollama: binary not found on PATH");
            return false;
        };

        info!("Starting Ollama server ({})", binary.display());
        let child = Command::new(&binary)
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(child) => {
                *self.server.lock().await = Some(child);
                let running = self.wait_until_running().await;
                if !running {
                    warn!("Ollama did not become ready within {:?}", STARTUP_TIMEOUT);
                }
                running
            }
            Err(e) => {
                error!("Failed to spawn ollama serve: {}", e);
                false
            }
        }
    }

    async fn stop(&self) -> bool {
        if let Some(mut child) = self.server.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop Ollama server: {}", e);
                return false;
            }
            info!("Stopped Ollama server");
            return true;
        }

        if !self.is_running().await {
            return true;
        }

        let script = if cfg!(windows) {
            "taskkill /IM ollama.exe /F"
        } else {
            "pkill -f 'ollama serve'"
        };
        match run_shell(script).await {
            Ok(true) => !self.is_running().await,
            Ok(false) | Err(_) => {
                warn!("Ollama is running but was not started by lmapp and could not be stopped");
                false
            }
        }
    }

    async fn get_version(&self) -> Option<String> {
        let binary = self.binary()?;
        probe_version(&binary).await
    }

    async fn list_models(&self) -> Vec<String> {
        let response = match self.http_client.get(self.url("/api/tags")).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Listing Ollama models failed: HTTP {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                debug!("Listing Ollama models failed: {}", e);
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                warn!("Failed to parse Ollama model list: {}", e);
                Vec::new()
            }
        }
    }

    async fn download_model(&self, name: &str, mut progress: Option<ProgressCallback<'_>>) -> bool {
        info!("Pulling Ollama model {}", name);
        let response = self
            .http_client
            .post(self.url("/api/pull"))
            .timeout(Duration::from_secs(60 * 60))
            .json(&serde_json::json!({ "name": name, "stream": true }))
            .send()
            .await;

        let mut response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                error!("Ollama pull failed: HTTP {}", response.status());
                return false;
            }
            Err(e) => {
                error!("Ollama pull failed: {}", e);
                return false;
            }
        };

        let mut lines = LineBuffer::new();
        let mut succeeded = false;
        let mut handle_line = |line: &str| -> bool {
            match parse_json_line::<PullProgress>(line) {
                Ok(event) => {
                    if let Some(err) = event.error {
                        error!("Ollama pull error: {}", err);
                        return false;
                    }
                    if let Some(cb) = progress.as_mut() {
                        cb(&event.describe());
                    }
                    if event.status == "success" {
                        succeeded = true;
                    }
                    true
                }
                Err(e) => {
                    warn!("{}", e);
                    true
                }
            }
        };

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    for line in lines.push(&chunk) {
                        if !handle_line(&line) {
                            return false;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Ollama pull stream interrupted: {}", e);
                    return false;
                }
            }
        }
        if let Some(line) = lines.finish() {
            if !handle_line(&line) {
                return false;
            }
        }

        succeeded
    }

    async fn remove_model(&self, name: &str) -> bool {
        match self
            .http_client
            .delete(self.url("/api/delete"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Failed to remove Ollama model {}: {}", name, e);
                false
            }
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError> {
        self.policy
            .run("ollama chat", || self.generate(request))
            .await
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_token: TokenCallback<'_>,
    ) -> Result<String, BackendError> {
        let mut response = self
            .policy
            .run("ollama stream", || self.send_generate(request, true))
            .await?;

        let mut lines = LineBuffer::new();
        let mut full = String::new();
        let mut apply = |line: &str, full: &mut String| -> Result<(), BackendError> {
            let event: GenerateResponse = parse_json_line(line)?;
            if !event.response.is_empty() {
                on_token(&event.response);
                full.push_str(&event.response);
            }
            Ok(())
        };

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout.as_secs()))?
        {
            for line in lines.push(&chunk) {
                apply(&line, &mut full)?;
            }
        }
        if let Some(line) = lines.finish() {
            apply(&line, &mut full)?;
        }
        Ok(full)
    }
}

impl fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

impl PullProgress {
    fn describe(&self) -> String {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                format!("{} ({}%)", self.status, done * 100 / total)
            }
            _ => self.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        assert_eq!(
            normalize_endpoint("http://localhost:11434/".to_string()),
            "http://localhost:11434"
        );
        assert_eq!(
            normalize_endpoint("127.0.0.1:11434".to_string()),
            "http://127.0.0.1:11434"
        );
    }

    #[test]
    fn test_generate_request_serialization() {
        let request = ChatRequest::new("Hello", "tinyllama").with_system_prompt("Be nice");
        let body = GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "tinyllama");
        assert_eq!(json["system"], "Be nice");
        assert_eq!(json["stream"], false);
        assert!(json["options"]["temperature"].is_number());
    }

    #[test]
    fn test_tags_response_parsing() {
        let tags: TagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"tinyllama:latest","size":1},{"name":"mistral:latest"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["tinyllama:latest", "mistral:latest"]);
    }

    #[test]
    fn test_pull_progress_description() {
        let event: PullProgress =
            serde_json::from_str(r#"{"status":"downloading","total":200,"completed":50}"#).unwrap();
        assert_eq!(event.describe(), "downloading (25%)");

        let event: PullProgress = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(event.describe(), "success");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_running() {
        let backend = OllamaBackend::with_options(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            RecoveryPolicy::no_retry(),
        );
        assert!(!backend.is_running().await);
        assert!(backend.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_chat_against_unreachable_server_is_transient() {
        let backend = OllamaBackend::with_options(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            RecoveryPolicy::no_retry(),
        );
        let err = backend
            .chat(&ChatRequest::new("hi", "tinyllama"))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
