//! Declarative workflow execution
//!
//! A workflow is an ordered list of steps loaded from YAML. The engine renders
//! each step's `{key}` placeholders from a variable store, dispatches it to a
//! named action in the [`ActionRegistry`], and merges object results back
//! into the store before the next step.

pub mod actions;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod llm;
pub mod registry;
pub mod template;
pub mod types;

pub use discovery::{find_workflow, list_available_workflows, WorkflowSummary};
pub use engine::{StepResult, WorkflowEngine, WorkflowRun};
pub use error::WorkflowError;
pub use llm::WorkflowLlm;
pub use registry::{ActionHandler, ActionRegistry, BoxedFuture, FnAction};
pub use template::render;
pub use types::{Variables, Workflow, WorkflowStep};
