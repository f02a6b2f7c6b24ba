use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::backend::BackendKind;

/// Launcher for locally running language models
#[derive(Parser, Debug)]
#[command(
    name = "lmapp",
    about = "Launcher for locally running language models",
    version,
    long_about = "lmapp detects, installs and drives local LLM runtimes (Ollama, llamafile) \
                  and runs multi-step workflow templates against them."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run or list workflow templates",
        long_about = "Runs a workflow template step by step against the selected backend.\n\n\
                      Examples:\n  \
                      lmapp workflow --list\n  \
                      lmapp workflow email_writer\n  \
                      lmapp workflow research_paper --set topic=\"memory safety\" --verbose"
    )]
    Workflow(WorkflowArgs),

    #[command(about = "Show system resources and backend status")]
    Status(StatusArgs),

    #[command(
        about = "Install a backend and a default model",
        long_about = "Checks system resources, installs the recommended (or chosen) backend \
                      and downloads a model sized for the available RAM.\n\n\
                      Examples:\n  \
                      lmapp install\n  \
                      lmapp install --backend llamafile --yes"
    )]
    Install(InstallArgs),

    #[command(about = "Send a single prompt to the selected backend")]
    Chat(ChatArgs),

    #[command(about = "Print the effective configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct WorkflowArgs {
    #[arg(value_name = "NAME", help = "Workflow name to execute")]
    pub name: Option<String>,

    #[arg(long, help = "List available workflows")]
    pub list: bool,

    #[arg(long, help = "Print each step's prompt and raw result")]
    pub verbose: bool,

    #[arg(long, value_name = "DIR", help = "Workflow directory (overrides LMAPP_WORKFLOW_DIR)")]
    pub dir: Option<PathBuf>,

    #[arg(
        long = "set",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        help = "Seed a workflow variable (repeatable)"
    )]
    pub set: Vec<(String, String)>,

    #[arg(long, help = "Use the mock backend when no real backend is running")]
    pub fallback_mock: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    #[arg(
        short = 'b',
        long,
        value_parser = parse_backend_kind,
        help = "Backend to install (defaults to the recommendation for this machine)"
    )]
    pub backend: Option<BackendKind>,

    #[arg(short = 'y', long, help = "Answer yes to every confirmation")]
    pub yes: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ChatArgs {
    #[arg(value_name = "PROMPT", help = "Prompt to send")]
    pub prompt: String,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name (overrides LMAPP_MODEL)")]
    pub model: Option<String>,

    #[arg(short = 't', long, value_name = "TEMP", help = "Sampling temperature (0.0-2.0)")]
    pub temperature: Option<f32>,

    #[arg(short = 's', long, help = "Print tokens as they arrive")]
    pub stream: bool,

    #[arg(long, help = "Use the mock backend when no real backend is running")]
    pub fallback_mock: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_backend_kind(s: &str) -> Result<BackendKind, String> {
    BackendKind::from_name(s)
        .ok_or_else(|| format!("Invalid backend: {}. Valid options: ollama, llamafile, mock", s))
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_workflow_defaults() {
        let args = CliArgs::parse_from(["lmapp", "workflow"]);
        match args.command {
            Commands::Workflow(wf) => {
                assert!(wf.name.is_none());
                assert!(!wf.list);
                assert!(!wf.verbose);
                assert!(wf.set.is_empty());
                assert!(!wf.fallback_mock);
            }
            _ => panic!("Expected Workflow command"),
        }
    }

    #[test]
    fn test_workflow_with_variables() {
        let args = CliArgs::parse_from([
            "lmapp",
            "workflow",
            "research_paper",
            "--set",
            "topic=borrow checker",
            "--set",
            "expr=a=b",
            "--verbose",
        ]);
        match args.command {
            Commands::Workflow(wf) => {
                assert_eq!(wf.name.as_deref(), Some("research_paper"));
                assert!(wf.verbose);
                assert_eq!(
                    wf.set,
                    vec![
                        ("topic".to_string(), "borrow checker".to_string()),
                        ("expr".to_string(), "a=b".to_string()),
                    ]
                );
            }
            _ => panic!("Expected Workflow command"),
        }
    }

    #[test]
    fn test_invalid_set_rejected() {
        assert!(CliArgs::try_parse_from(["lmapp", "workflow", "x", "--set", "novalue"]).is_err());
        assert!(CliArgs::try_parse_from(["lmapp", "workflow", "x", "--set", "=v"]).is_err());
    }

    #[test]
    fn test_install_backend_parsing() {
        let args = CliArgs::parse_from(["lmapp", "install", "--backend", "LLAMAFILE", "-y"]);
        match args.command {
            Commands::Install(install) => {
                assert_eq!(install.backend, Some(BackendKind::Llamafile));
                assert!(install.yes);
            }
            _ => panic!("Expected Install command"),
        }
        assert!(CliArgs::try_parse_from(["lmapp", "install", "--backend", "vllm"]).is_err());
    }

    #[test]
    fn test_chat_args() {
        let args = CliArgs::parse_from([
            "lmapp",
            "--debug",
            "chat",
            "hello",
            "--temperature",
            "0.2",
            "--stream",
        ]);
        assert!(args.debug);
        match args.command {
            Commands::Chat(chat) => {
                assert_eq!(chat.prompt, "hello");
                assert_eq!(chat.temperature, Some(0.2));
                assert!(chat.stream);
                assert!(chat.model.is_none());
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_config_format() {
        let args = CliArgs::parse_from(["lmapp", "config", "--format", "json"]);
        match args.command {
            Commands::Config(config) => assert_eq!(config.format, OutputFormatArg::Json),
            _ => panic!("Expected Config command"),
        }
    }
}
