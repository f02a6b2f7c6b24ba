//! Workflow execution engine
//!
//! Steps run strictly in order. Each step's prompt is rendered against the
//! variable store, dispatched to its action handler, and an object result is
//! merged back before the next step starts.

use super::error::WorkflowError;
use super::registry::ActionRegistry;
use super::template::render;
use super::types::{Variables, Workflow, WorkflowStep};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub index: usize,
    pub step: WorkflowStep,
    pub rendered_prompt: String,
    pub result: Value,
}

pub struct WorkflowEngine {
    registry: Arc<ActionRegistry>,
    variables: Variables,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            variables: Variables::new(),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Variable store of the most recent run
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Reads and parses a YAML workflow definition
    pub fn load(path: &Path) -> Result<Workflow, WorkflowError> {
        let source = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_at(&source, path)
    }

    pub fn parse(source: &str) -> Result<Workflow, WorkflowError> {
        parse_at(source, Path::new("<inline>"))
    }

    /// Starts a run over `workflow`
    ///
    /// The variable store is reset and seeded with `context`. Nothing executes
    /// until [`WorkflowRun::next_step`] is awaited; the exclusive borrow keeps
    /// a second run from starting on this engine while one is in progress.
    pub fn execute<'a>(&'a mut self, workflow: &'a Workflow, context: Variables) -> WorkflowRun<'a> {
        info!("Executing workflow '{}' ({} steps)", workflow.name, workflow.len());
        self.variables = context;
        WorkflowRun {
            engine: self,
            workflow,
            next: 0,
            finished: false,
        }
    }
}

fn parse_at(source: &str, path: &Path) -> Result<Workflow, WorkflowError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(source).map_err(|source| WorkflowError::Parse {
            path: PathBuf::from(path),
            source,
        })?;

    let Some(mapping) = document.as_mapping() else {
        return Err(WorkflowError::Malformed {
            message: format!("{}: expected a mapping at the top level", path.display()),
        });
    };

    match mapping.get("steps") {
        Some(serde_yaml::Value::Sequence(_)) => {}
        Some(_) => {
            return Err(WorkflowError::Malformed {
                message: format!("{}: `steps` must be a list", path.display()),
            })
        }
        None => {
            return Err(WorkflowError::Malformed {
                message: format!("{}: missing required field `steps`", path.display()),
            })
        }
    }

    serde_yaml::from_value(document).map_err(|e| WorkflowError::Malformed {
        message: format!("{}: {}", path.display(), e),
    })
}

/// A run in progress, consumed one step at a time
///
/// Dropping it early leaves the remaining steps unexecuted. After an error
/// the run yields nothing further.
pub struct WorkflowRun<'a> {
    engine: &'a mut WorkflowEngine,
    workflow: &'a Workflow,
    next: usize,
    finished: bool,
}

impl<'a> WorkflowRun<'a> {
    pub fn total_steps(&self) -> usize {
        self.workflow.len()
    }

    pub fn variables(&self) -> &Variables {
        &self.engine.variables
    }

    /// Executes the next step, or returns `None` once the run is over
    pub async fn next_step(&mut self) -> Option<Result<StepResult, WorkflowError>> {
        if self.finished {
            return None;
        }
        let index = self.next;
        let workflow = self.workflow;
        let Some(step) = workflow.steps.get(index) else {
            self.finished = true;
            return None;
        };

        let outcome = self.run_step(index, step).await;
        match outcome {
            Ok(_) => self.next += 1,
            Err(_) => self.finished = true,
        }
        Some(outcome)
    }

    /// Drives the run to completion
    pub async fn collect(mut self) -> Result<Vec<StepResult>, WorkflowError> {
        let mut results = Vec::with_capacity(self.total_steps());
        while let Some(outcome) = self.next_step().await {
            results.push(outcome?);
        }
        Ok(results)
    }

    async fn run_step(&mut self, index: usize, step: &WorkflowStep) -> Result<StepResult, WorkflowError> {
        let rendered_prompt = render(&step.prompt, &self.engine.variables);

        let handler = self
            .engine
            .registry
            .get(&step.action)
            .ok_or_else(|| WorkflowError::UnknownAction {
                step: index,
                action: step.action.clone(),
            })?;

        debug!("Step {}: {} <- {:?}", index, step.action, rendered_prompt);

        let result = handler
            .call(&rendered_prompt, &step.params, &self.engine.variables)
            .await
            .map_err(|source| WorkflowError::Handler {
                step: index,
                action: step.action.clone(),
                source,
            })?;

        if let Value::Object(map) = &result {
            for (key, value) in map {
                self.engine.variables.insert(key.clone(), value.clone());
            }
        }

        Ok(StepResult {
            index,
            step: step.clone(),
            rendered_prompt,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_registry() -> Arc<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        registry.register_fn("echo", |prompt, _, _| Ok(json!({ "last": prompt })));
        registry.register_fn("scalar", |_, _, _| Ok(json!(42)));
        registry.register_fn("fail", |_, _, _| Err(anyhow::anyhow!("file not found")));
        Arc::new(registry)
    }

    fn context(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_parse_defaults_optional_fields() {
        let workflow = WorkflowEngine::parse(
            r#"
steps:
  - prompt: "Ask: {topic}"
    action: echo
"#,
        )
        .unwrap();
        assert_eq!(workflow.name, "Untitled");
        assert_eq!(workflow.description, "");
        assert!(workflow.metadata.is_empty());
        assert!(workflow.steps[0].params.is_empty());
    }

    #[test]
    fn test_parse_missing_steps_is_malformed() {
        let err = WorkflowEngine::parse("name: nothing\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Malformed { .. }));

        let err = WorkflowEngine::parse("name: x\nsteps: 3\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Malformed { .. }));

        let err = WorkflowEngine::parse("steps:\n  - prompt: no action\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Malformed { .. }));
    }

    #[test]
    fn test_parse_syntax_error() {
        let err = WorkflowEngine::parse("steps: [unclosed").unwrap_err();
        assert!(matches!(err, WorkflowError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_echo_scenario() {
        let workflow = Workflow::new("echo", vec![WorkflowStep::new("Ask: {topic}", "echo")]);
        let mut engine = WorkflowEngine::new(echo_registry());

        let results = engine
            .execute(&workflow, context(json!({"topic": "rust"})))
            .collect()
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].rendered_prompt, "Ask: rust");
        assert_eq!(
            Value::Object(engine.variables().clone()),
            json!({"topic": "rust", "last": "Ask: rust"})
        );
    }

    #[tokio::test]
    async fn test_later_steps_see_earlier_results() {
        let workflow = Workflow::new(
            "chain",
            vec![
                WorkflowStep::new("one", "echo"),
                WorkflowStep::new("prev was {last}", "echo"),
                WorkflowStep::new("", "scalar"),
            ],
        );
        let mut engine = WorkflowEngine::new(echo_registry());
        let results = engine.execute(&workflow, Variables::new()).collect().await.unwrap();

        let indices: Vec<_> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(results[1].rendered_prompt, "prev was one");
        assert_eq!(results[2].result, json!(42));
        assert_eq!(engine.variables().len(), 1);
        assert_eq!(engine.variables()["last"], "prev was one");
    }

    #[tokio::test]
    async fn test_unknown_action_stops_run() {
        let workflow = Workflow::new(
            "broken",
            vec![
                WorkflowStep::new("a", "echo"),
                WorkflowStep::new("b", "teleport"),
                WorkflowStep::new("c", "echo"),
            ],
        );
        let mut engine = WorkflowEngine::new(echo_registry());
        let mut run = engine.execute(&workflow, Variables::new());

        assert!(run.next_step().await.unwrap().is_ok());
        let err = run.next_step().await.unwrap().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownAction { step: 1, ref action } if action == "teleport"));
        assert!(run.next_step().await.is_none());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let workflow = Workflow::new("f", vec![WorkflowStep::new("", "fail")]);
        let mut engine = WorkflowEngine::new(echo_registry());
        let err = engine
            .execute(&workflow, Variables::new())
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Handler { step: 0, .. }));
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn test_steps_run_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = ActionRegistry::new();
        registry.register_fn("count", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

        let workflow = Workflow::new(
            "lazy",
            vec![WorkflowStep::new("", "count"), WorkflowStep::new("", "count")],
        );
        let mut engine = WorkflowEngine::new(Arc::new(registry));
        let mut run = engine.execute(&workflow, Variables::new());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        run.next_step().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(run);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_each_run_starts_fresh() {
        let workflow = Workflow::new("w", vec![WorkflowStep::new("x", "echo")]);
        let mut engine = WorkflowEngine::new(echo_registry());
        engine
            .execute(&workflow, context(json!({"stale": true})))
            .collect()
            .await
            .unwrap();
        engine.execute(&workflow, Variables::new()).collect().await.unwrap();
        assert!(!engine.variables().contains_key("stale"));
    }
}
