//! Backend data types
//!
//! Snapshot types shared by every backend variant, independent of any
//! specific inference runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a backend, ordered from least to most available
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    NotInstalled,
    Installed,
    Running,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::NotInstalled => write!(f, "not installed"),
            BackendStatus::Installed => write!(f, "installed"),
            BackendStatus::Running => write!(f, "running"),
        }
    }
}

/// Point-in-time description of a backend
///
/// Recomputed on every status query; never a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub display_name: String,
    pub version: Option<String>,
    pub status: BackendStatus,
}

/// Closed set of backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HTTP-service-managed runtime (ollama daemon)
    Ollama,
    /// Process-managed runtime (llamafile server)
    Llamafile,
    /// Deterministic test double
    Mock,
}

impl BackendKind {
    /// Real providers in tie-break precedence order
    pub const CANDIDATES: &'static [BackendKind] = &[BackendKind::Ollama, BackendKind::Llamafile];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Llamafile => "llamafile",
            BackendKind::Mock => "mock",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Some(BackendKind::Ollama),
            "llamafile" => Some(BackendKind::Llamafile),
            "mock" => Some(BackendKind::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-turn chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
}

impl ChatRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: None,
            temperature: Self::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Receives human-readable progress lines during model downloads
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Receives generated text fragments while streaming
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(BackendStatus::NotInstalled < BackendStatus::Installed);
        assert!(BackendStatus::Installed < BackendStatus::Running);
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(BackendKind::from_name("Ollama"), Some(BackendKind::Ollama));
        assert_eq!(BackendKind::from_name(" llamafile "), Some(BackendKind::Llamafile));
        assert_eq!(BackendKind::from_name("mock"), Some(BackendKind::Mock));
        assert_eq!(BackendKind::from_name("vllm"), None);
    }

    #[test]
    fn test_candidates_exclude_mock() {
        assert_eq!(BackendKind::CANDIDATES[0], BackendKind::Ollama);
        assert!(!BackendKind::CANDIDATES.contains(&BackendKind::Mock));
    }

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::new("hi", "tinyllama")
            .with_system_prompt("be brief")
            .with_temperature(0.2);
        assert_eq!(request.model, "tinyllama");
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
    }
}
