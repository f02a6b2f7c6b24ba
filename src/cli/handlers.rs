//! Subcommand handlers
//!
//! Each handler returns the process exit code. Diagnostics go to stderr with
//! a remediation hint; results go to stdout.

use anyhow::{Context, Result};
use clap::CommandFactory;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::commands::{ChatArgs, CliArgs, ConfigArgs, InstallArgs, StatusArgs, WorkflowArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::backend::{
    AssumeYes, BackendDetector, BackendError, BackendInstaller, BackendKind, BackendSelector,
    ChatRequest, InstallError, InstallPrompt, SystemCheck, SystemReport,
};
use crate::config::LmappConfig;
use crate::workflow::{
    find_workflow, list_available_workflows, ActionRegistry, Variables, WorkflowEngine,
    WorkflowError, WorkflowLlm,
};

const RESULT_PREVIEW_CHARS: usize = 200;

/// Suggested next step for a backend failure
pub fn remediation(err: &BackendError) -> &'static str {
    match err {
        BackendError::Unavailable { .. } => {
            "Run `lmapp install` to set up a backend, or pass --fallback-mock to try things out"
        }
        BackendError::NotRunning { .. } => "Start the backend (e.g. `ollama serve`) and retry",
        BackendError::ModelNotFound { .. } => {
            "Run `lmapp status` to see installed models, or `lmapp install` to download one"
        }
        BackendError::Timeout { .. } => "Increase LMAPP_TIMEOUT or try a smaller model",
        BackendError::Connection { .. } => "Check that the backend server is reachable",
        BackendError::StreamingUnsupported { .. } => "Retry without --stream",
        _ => "Run with --debug for details",
    }
}

fn report_backend_error(err: &BackendError) {
    eprintln!("Error: {}", err);
    eprintln!("Hint: {}", remediation(err));
}

fn report_workflow_error(err: &WorkflowError) {
    eprintln!("Error: {}", err);
    let backend_err = match err {
        WorkflowError::Handler { source, .. } => source.downcast_ref::<BackendError>(),
        _ => None,
    };
    match (err, backend_err) {
        (_, Some(backend_err)) => eprintln!("Hint: {}", remediation(backend_err)),
        (WorkflowError::UnknownAction { .. }, _) => {
            eprintln!("Hint: check the step's `action` against the built-in actions")
        }
        (WorkflowError::Malformed { .. } | WorkflowError::Parse { .. }, _) => {
            eprintln!("Hint: a workflow needs a `steps` list of {{prompt, action, params}}")
        }
        _ => {}
    }
}

fn preview(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > RESULT_PREVIEW_CHARS {
        let head: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text
    }
}

pub async fn handle_workflow(args: &WorkflowArgs, config: &LmappConfig) -> i32 {
    let dir = args.dir.clone().unwrap_or_else(|| config.workflow_dir.clone());
    debug!("Workflow directory: {}", dir.display());

    if args.list {
        return match OutputFormatter::new(OutputFormat::Human)
            .format_workflows(&list_available_workflows(&dir))
        {
            Ok(out) => {
                print!("{}", out);
                0
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        };
    }

    let Some(name) = args.name.as_deref() else {
        let mut command = CliArgs::command();
        if let Some(sub) = command.find_subcommand_mut("workflow") {
            let _ = sub.print_help();
        }
        return 0;
    };

    let Some(summary) = find_workflow(&dir, name) else {
        eprintln!("Workflow '{}' not found in {}", name, dir.display());
        let available = list_available_workflows(&dir);
        if available.is_empty() {
            eprintln!("No workflows available.");
        } else {
            eprintln!("\nAvailable workflows:");
            for wf in available {
                eprintln!("  - {}", wf.name);
            }
        }
        return 0;
    };

    let workflow = match WorkflowEngine::load(&summary.path) {
        Ok(workflow) => workflow,
        Err(e) => {
            report_workflow_error(&e);
            return 1;
        }
    };

    let selector = BackendSelector::from_config(config).with_mock_fallback(args.fallback_mock);
    let llm = Arc::new(WorkflowLlm::new(selector).with_temperature(config.temperature));
    let registry = Arc::new(ActionRegistry::with_defaults(llm));
    let mut engine = WorkflowEngine::new(registry);

    let context: Variables = args
        .set
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    println!("Executing workflow: {}", workflow.name);
    if !workflow.description.is_empty() {
        println!("{}", workflow.description);
    }
    println!();

    let total = workflow.len();
    let mut run = engine.execute(&workflow, context);
    while let Some(outcome) = run.next_step().await {
        match outcome {
            Ok(step) => {
                if args.verbose {
                    println!("--- Step {}: {} ---", step.index + 1, step.step.action);
                    println!("Prompt: {}", step.rendered_prompt);
                    println!("Result: {}\n", step.result);
                } else {
                    println!("[{}/{}] {}", step.index + 1, total, step.step.action);
                }
            }
            Err(e) => {
                report_workflow_error(&e);
                return 1;
            }
        }
    }
    drop(run);

    println!("\nWorkflow '{}' completed", workflow.name);
    if !engine.variables().is_empty() {
        println!("\nResults:");
        for (key, value) in engine.variables() {
            println!("  {}: {}", key, preview(value));
        }
    }
    0
}

async fn system_report(data_dir: &Path) -> Result<SystemReport> {
    let data_dir = data_dir.to_path_buf();
    tokio::task::spawn_blocking(move || SystemCheck::run(&data_dir))
        .await
        .context("System check task failed")
}

pub async fn handle_status(args: &StatusArgs, config: &LmappConfig) -> i32 {
    let report = match system_report(&config.data_dir).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };
    let rows = config.create_detector().status_rows().await;

    match OutputFormatter::new(args.format.into()).format_status(&report, &rows) {
        Ok(out) => {
            print!("{}", out);
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

/// Reads a yes/no answer from stdin; anything but "n"/"no" counts as yes
struct StdinPrompt;

impl InstallPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{} [Y/n] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        let input = input.trim().to_lowercase();
        !(input == "n" || input == "no")
    }
}

pub async fn handle_install(args: &InstallArgs, config: &LmappConfig) -> i32 {
    let report = match system_report(&config.data_dir).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };

    let detector = match args.backend {
        Some(BackendKind::Mock) => BackendDetector::new(vec![BackendKind::Mock.create(config)]),
        _ => config.create_detector(),
    };
    let prompt: Box<dyn InstallPrompt> = if args.yes || !io::stdin().is_terminal() {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinPrompt)
    };
    let installer = BackendInstaller::new(Arc::new(detector), prompt);

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    let mut on_progress = |message: &str| bar.set_message(message.to_string());

    let choice = args.backend.map(|kind| kind.as_str());
    let outcome = installer
        .run_wizard(&report, choice, Some(&mut on_progress))
        .await;
    bar.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            if outcome.running {
                println!("Backend ready: {}", outcome.backend);
            } else {
                println!("Backend installed: {}", outcome.backend);
            }
            match &outcome.model {
                Some(model) => println!("Default model: {}", model),
                None => println!(
                    "No model installed yet. Run `lmapp install` again to download one."
                ),
            }
            if outcome.running {
                0
            } else if outcome.model.is_some() {
                eprintln!(
                    "Error: {} is installed but its server did not start. Run with --debug for details",
                    outcome.backend
                );
                1
            } else {
                0
            }
        }
        Err(InstallError::SystemCheck { failures }) => {
            eprintln!("System check failed:");
            for failure in failures {
                eprintln!("  - {}", failure);
            }
            1
        }
        Err(e) => {
            error!("Installation failed: {}", e);
            eprintln!("Error: {}", e);
            1
        }
    }
}

pub async fn handle_chat(args: &ChatArgs, config: &LmappConfig) -> i32 {
    let temperature = args.temperature.unwrap_or(config.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        eprintln!("Error: temperature must be between 0.0 and 2.0, got {}", temperature);
        return 2;
    }

    let selector = BackendSelector::from_config(config)
        .with_model(args.model.clone().or_else(|| config.model.clone()))
        .with_mock_fallback(args.fallback_mock);

    let selected = match selector.select().await {
        Ok(selected) => selected,
        Err(e) => {
            report_backend_error(&e);
            return 1;
        }
    };
    debug!("Chatting with {}", selected.description);

    let request =
        ChatRequest::new(args.prompt.clone(), selected.model.clone()).with_temperature(temperature);

    let result = if args.stream && selected.backend.supports_streaming() {
        let mut on_token = |token: &str| {
            print!("{}", token);
            let _ = io::stdout().flush();
        };
        let result = selected.backend.stream_chat(&request, &mut on_token).await;
        println!();
        result
    } else {
        let result = selected.backend.chat(&request).await;
        if let Ok(reply) = &result {
            println!("{}", reply);
        }
        result
    };

    match result {
        Ok(_) => 0,
        Err(e) => {
            report_backend_error(&e);
            1
        }
    }
}

pub async fn handle_config(args: &ConfigArgs, config: &LmappConfig) -> i32 {
    match OutputFormatter::new(args.format.into()).format_config(config) {
        Ok(out) => {
            print!("{}", out);
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remediation_hints() {
        let hint = remediation(&BackendError::Unavailable {
            message: "none".to_string(),
        });
        assert!(hint.contains("lmapp install"));
        assert!(remediation(&BackendError::StreamingUnsupported {
            backend: "mock".to_string()
        })
        .contains("--stream"));
    }

    #[test]
    fn test_preview_truncates_long_values() {
        let long = "x".repeat(RESULT_PREVIEW_CHARS + 10);
        let shown = preview(&json!(long));
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), RESULT_PREVIEW_CHARS + 3);
        assert_eq!(preview(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_workflow_unknown_name_exits_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = WorkflowArgs {
            name: Some("missing".to_string()),
            list: false,
            verbose: false,
            dir: Some(dir.path().to_path_buf()),
            set: Vec::new(),
            fallback_mock: true,
        };
        assert_eq!(handle_workflow(&args, &LmappConfig::default()).await, 0);
    }

    #[tokio::test]
    async fn test_workflow_runs_with_mock_fallback() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("report.yaml"),
            "name: report\nsteps:\n  - prompt: Format\n    action: format_report\n",
        )
        .unwrap();
        let mut config = LmappConfig::default();
        config.backend = crate::config::BackendPreference::Fixed(BackendKind::Mock);

        let args = WorkflowArgs {
            name: Some("report".to_string()),
            list: false,
            verbose: true,
            dir: Some(dir.path().to_path_buf()),
            set: vec![("analysis".to_string(), "ok".to_string())],
            fallback_mock: true,
        };
        assert_eq!(handle_workflow(&args, &config).await, 0);
    }
}
