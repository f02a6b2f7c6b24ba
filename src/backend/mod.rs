//! LLM backend abstraction
//!
//! A uniform async interface over local inference runtimes (Ollama,
//! llamafile) plus an in-memory mock, with detection, installation and
//! retry support.

pub mod client;
pub mod detector;
pub mod error;
pub mod installer;
pub mod llamafile;
pub mod mock;
pub mod models;
pub mod ollama;
pub mod process;
pub mod recovery;
pub mod selector;
pub mod system;
pub mod types;

pub use client::LLMBackend;
pub use detector::{recommend_kind, BackendDetector, PRIMARY_RAM_THRESHOLD_GB};
pub use error::BackendError;
pub use installer::{AssumeYes, BackendInstaller, InstallError, InstallOutcome, InstallPrompt};
pub use llamafile::{LlamafileBackend, DEFAULT_LLAMAFILE_PORT};
pub use mock::MockBackend;
pub use models::{DefaultModel, ModelCatalog};
pub use ollama::{OllamaBackend, DEFAULT_OLLAMA_HOST};
pub use recovery::RecoveryPolicy;
pub use selector::{BackendSelector, SelectedBackend};
pub use system::{SystemCheck, SystemReport};
pub use types::{BackendInfo, BackendKind, BackendStatus, ChatRequest, ProgressCallback, TokenCallback};
