//! llamafile backend
//!
//! Manages a llamafile server process directly: the runtime binary and GGUF
//! weights live under lmapp's data directory, and generation goes through the
//! server's OpenAI-compatible `/v1/chat/completions` endpoint.

use super::client::LLMBackend;
use super::error::BackendError;
use super::models::ModelCatalog;
use super::process::{find_executable, parse_json_line, probe_version, LineBuffer};
use super::recovery::RecoveryPolicy;
use super::types::{ChatRequest, ProgressCallback, TokenCallback};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const DEFAULT_LLAMAFILE_PORT: u16 = 8080;
const RUNTIME_URL: &str =
    "https://github.com/Mozilla-Ocho/llamafile/releases/download/0.8.13/llamafile-0.8.13";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MODEL_EXTENSION: &str = "gguf";

pub struct LlamafileBackend {
    data_dir: PathBuf,
    port: u16,
    http_client: Client,
    timeout: Duration,
    policy: RecoveryPolicy,
    server: Mutex<Option<ServerProcess>>,
}

struct ServerProcess {
    child: Child,
    model: String,
}

impl LlamafileBackend {
    /// `data_dir` holds `bin/llamafile` and `models/*.gguf`
    pub fn new(data_dir: impl Into<PathBuf>, port: u16) -> Self {
        Self::with_options(
            data_dir,
            port,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            RecoveryPolicy::default(),
        )
    }

    pub fn with_options(
        data_dir: impl Into<PathBuf>,
        port: u16,
        timeout: Duration,
        policy: RecoveryPolicy,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            data_dir: data_dir.into(),
            port,
            http_client,
            timeout,
            policy,
            server: Mutex::new(None),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    fn managed_binary(&self) -> PathBuf {
        self.data_dir
            .join("bin")
            .join(format!("llamafile{}", std::env::consts::EXE_SUFFIX))
    }

    fn binary(&self) -> Option<PathBuf> {
        let managed = self.managed_binary();
        if managed.is_file() {
            Some(managed)
        } else {
            find_executable("llamafile")
        }
    }

    fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir().join(format!("{}.{}", name, MODEL_EXTENSION))
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn probe(&self) -> Result<bool, BackendError> {
        let response = self
            .http_client
            .get(self.url("/health"))
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

    /// Streams `url` into `dest`, reporting progress roughly every 10%
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<(), BackendError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut response = self
            .http_client
            .get(url)
            .timeout(Duration::from_secs(60 * 60))
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, 60 * 60))?;

        if !response.status().is_success() {
            return Err(BackendError::Api {
                status: response.status().as_u16(),
                message: format!("Download of {} failed", url),
            });
        }

        let partial = dest.with_extension("part");
        let written = match Self::write_body(&mut response, &partial, progress.as_mut()).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, dest).await?;
        if let Some(cb) = progress.as_mut() {
            cb("download complete");
        }
        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }

    async fn write_body(
        response: &mut reqwest::Response,
        partial: &Path,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<u64, BackendError> {
        let total = response.content_length();
        let mut file = tokio::fs::File::create(partial).await?;
        let mut written: u64 = 0;
        let mut last_reported = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BackendError::from_reqwest(e, 60 * 60))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let (Some(total), Some(cb)) = (total, progress.as_mut()) {
                let percent = written * 100 / total.max(1);
                if percent >= last_reported + 10 {
                    last_reported = percent - percent % 10;
                    cb(&format!("downloading ({}%)", percent));
                }
            }
        }
        file.flush().await?;
        Ok(written)
    }

    async fn loaded_model(&self) -> Option<String> {
        self.server.lock().await.as_ref().map(|s| s.model.clone())
    }

    async fn send_completion(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        if !self.list_models().await.iter().any(|m| m == &request.model) {
            return Err(BackendError::ModelNotFound {
                model: request.model.clone(),
            });
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        let body = CompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            stream,
        };

        let response = self
            .http_client
            .post(self.url("/v1/chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout.as_secs()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            error!("llamafile returned error status {}: {}", status, message);
            Err(BackendError::Api { status, message })
        }
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let response = self.send_completion(request, false).await?;
        let body: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    message: format!("JSON parse error: {}", e),
                })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "No choices in response".to_string(),
            })
    }
}

#[async_trait]
impl LLMBackend for LlamafileBackend {
    fn backend_name(&self) -> &str {
        "llamafile"
    }

    fn display_name(&self) -> &str {
        "llamafile"
    }

    async fn is_installed(&self) -> bool {
        self.binary().is_some()
    }

    async fn is_running(&self) -> bool {
        match self.probe().await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!("llamafile not reachable on port {}: {}", self.port, e);
                false
            }
        }
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        self.policy.run("llamafile health check", || self.probe()).await
    }

    async fn install(&self) -> bool {
        if self.binary().is_some() {
            info!("llamafile already installed");
            return true;
        }

        let target = self.managed_binary();
        info!("Downloading llamafile runtime to {}", target.display());
        if let Err(e) = self.fetch_to_file(RUNTIME_URL, &target, None).await {
            error!("llamafile install failed: {}", e);
            return false;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).await
            {
                error!("Failed to mark llamafile executable: {}", e);
                return false;
            }
        }

        true
    }

    async fn start(&self) -> bool {
        if self.is_running().await {
            return true;
        }
        let Some(binary) = self.binary() else {
            warn!("Cannot start llamafile: runtime not installed");
            return false;
        };
        let Some(model) = self.list_models().await.into_iter().next() else {
            warn!("Cannot start llamafile: no model in {}", self.models_dir().display());
            return false;
        };

        let model_path = self.model_path(&model);
        info!("Starting llamafile server with {} on port {}", model, self.port);
        let spawned = Command::new(&binary)
            .arg("--server")
            .arg("--nobrowser")
            .arg("--port")
            .arg(self.port.to_string())
            .arg("-m")
            .arg(&model_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                *self.server.lock().await = Some(ServerProcess { child, model });
                let running = self.wait_until_running().await;
                if !running {
                    warn!("llamafile did not become ready within {:?}", STARTUP_TIMEOUT);
                }
                running
            }
            Err(e) => {
                error!("Failed to spawn llamafile: {}", e);
                false
            }
        }
    }

    async fn stop(&self) -> bool {
        match self.server.lock().await.take() {
            Some(mut process) => match process.child.kill().await {
                Ok(()) => {
                    info!("Stopped llamafile server ({})", process.model);
                    true
                }
                Err(e) => {
                    warn!("Failed to stop llamafile: {}", e);
                    false
                }
            },
            None => {
                let running = self.is_running().await;
                if running {
                    warn!("llamafile is running but was not started by lmapp");
                }
                !running
            }
        }
    }

    async fn get_version(&self) -> Option<String> {
        let binary = self.binary()?;
        probe_version(&binary).await
    }

    async fn list_models(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(self.models_dir()).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut models = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    models.push(stem.to_string());
                }
            }
        }
        models.sort();

        if let Some(active) = self.loaded_model().await {
            if let Some(pos) = models.iter().position(|m| *m == active) {
                let model = models.remove(pos);
                models.insert(0, model);
            }
        }
        models
    }

    async fn download_model(&self, name: &str, progress: Option<ProgressCallback<'_>>) -> bool {
        let (stem, url) = if name.starts_with("http://") || name.starts_with("https://") {
            let stem = name
                .rsplit('/')
                .next()
                .and_then(|file| file.strip_suffix(".gguf"))
                .unwrap_or("model");
            (stem.to_string(), name.to_string())
        } else if let Some(model) = ModelCatalog::find(name) {
            (model.name.to_string(), model.gguf_url.to_string())
        } else {
            error!("Unknown llamafile model '{}': pass a catalogue name or a GGUF URL", name);
            return false;
        };

        let dest = self.model_path(&stem);
        if dest.is_file() {
            info!("Model {} already downloaded", stem);
            return true;
        }

        info!("Downloading {} from {}", stem, url);
        match self.fetch_to_file(&url, &dest, progress).await {
            Ok(()) => true,
            Err(e) => {
                error!("Model download failed: {}", e);
                false
            }
        }
    }

    async fn remove_model(&self, name: &str) -> bool {
        match tokio::fs::remove_file(self.model_path(name)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove model {}: {}", name, e);
                false
            }
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError> {
        self.policy
            .run("llamafile chat", || self.complete(request))
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
            .run("llamafile stream", || self.send_completion(request, true))
            .await?;

        let mut lines = LineBuffer::new();
        let mut full = String::new();
        let mut apply = |line: &str, full: &mut String| -> Result<(), BackendError> {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                return Ok(());
            };
            if data == "[DONE]" {
                return Ok(());
            }
            let event: CompletionResponse = parse_json_line(data)?;
            if let Some(content) = event
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
            {
                on_token(&content);
                full.push_str(&content);
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

impl fmt::Debug for LlamafileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlamafileBackend")
            .field("data_dir", &self.data_dir)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceContent>,
    delta: Option<ChoiceDelta>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChoiceDelta {
    content: Option<String>,
}
