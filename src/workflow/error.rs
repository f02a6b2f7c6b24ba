//! Workflow error taxonomy

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The definition is missing a required field or has the wrong shape
    #[error("Malformed workflow: {message}")]
    Malformed { message: String },

    /// A step names an action the registry does not know
    #[error("Unknown action '{action}' in step {step}")]
    UnknownAction { step: usize, action: String },

    /// A handler failed while doing its own work
    #[error("Step {step} ({action}) failed: {source}")]
    Handler {
        step: usize,
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read workflow {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl WorkflowError {
    /// Index of the step that stopped the run, if the error came from one
    pub fn step(&self) -> Option<usize> {
        match self {
            WorkflowError::UnknownAction { step, .. } | WorkflowError::Handler { step, .. } => {
                Some(*step)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::UnknownAction {
            step: 2,
            action: "teleport".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown action 'teleport' in step 2");
        assert_eq!(err.step(), Some(2));

        let err = WorkflowError::Handler {
            step: 0,
            action: "analyze_document".to_string(),
            source: anyhow::anyhow!("file not found"),
        };
        assert!(err.to_string().contains("file not found"));

        let err = WorkflowError::Malformed {
            message: "missing field `steps`".to_string(),
        };
        assert_eq!(err.step(), None);
    }
}
