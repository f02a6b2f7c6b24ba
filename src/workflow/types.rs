//! Workflow definition types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The mutable mapping threaded through a run
pub type Variables = Map<String, Value>;

/// One unit of work: a templated prompt dispatched to a named action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub prompt: String,
    pub action: String,
    /// Opaque to the engine; interpreted only by the handler
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl WorkflowStep {
    pub fn new(prompt: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            action: action.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps,
            metadata: Map::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
