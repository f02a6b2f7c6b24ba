//! lmapp - launcher for locally running language models
//!
//! Two coupled subsystems make up the library:
//!
//! - **Workflows** ([`workflow`]): YAML-defined, multi-step procedures. Each
//!   step's `{key}` placeholders are filled from a variable store, the step is
//!   dispatched to a named action, and object results flow back into the store
//!   for later steps.
//! - **Backends** ([`backend`]): a uniform async interface over local inference
//!   runtimes (Ollama, llamafile) plus a deterministic mock, with detection,
//!   RAM-based recommendation, an install wizard and retry with exponential
//!   backoff for transient failures.
//!
//! # Example
//!
//! ```no_run
//! use lmapp::backend::{BackendDetector, BackendSelector, MockBackend};
//! use lmapp::workflow::{ActionRegistry, Variables, WorkflowEngine, WorkflowLlm};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = BackendSelector::new(BackendDetector::new(Vec::new()))
//!     .with_backend(Arc::new(MockBackend::running()));
//! let registry = ActionRegistry::with_defaults(Arc::new(WorkflowLlm::new(selector)));
//!
//! let workflow = WorkflowEngine::parse(
//!     "name: outline\nsteps:\n  - prompt: Outline {topic}\n    action: generate_outline\n",
//! )?;
//! let mut context = Variables::new();
//! context.insert("topic".into(), "ownership".into());
//!
//! let mut engine = WorkflowEngine::new(Arc::new(registry));
//! let steps = engine.execute(&workflow, context).collect().await?;
//! println!("{}", steps[0].result["outline"]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod util;
pub mod workflow;

pub use backend::{BackendError, BackendInfo, BackendKind, BackendStatus, LLMBackend};
pub use config::{ConfigError, LmappConfig};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use workflow::{ActionRegistry, Workflow, WorkflowEngine, WorkflowError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
