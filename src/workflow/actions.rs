//! Built-in workflow actions
//!
//! LLM-backed actions build a prompt from the variable store and call
//! [`WorkflowLlm::generate`]. The rest work locally: stdin, files, the
//! clipboard and a small offline help table.

use super::llm::WorkflowLlm;
use super::registry::{ActionHandler, ActionRegistry};
use super::template::value_to_text;
use super::types::Variables;
use crate::backend::process::{find_executable, truncate};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Characters of a document passed to `analyze_document`
pub const MAX_DOCUMENT_CHARS: usize = 10_000;

const DEFAULT_MAX_SEARCH_RESULTS: usize = 5;
const MAX_SEARCH_FILE_BYTES: u64 = 1024 * 1024;
const EXCERPT_CHARS: usize = 160;

impl ActionRegistry {
    /// Registry holding every built-in action
    pub fn with_defaults(llm: Arc<WorkflowLlm>) -> Self {
        let mut registry = Self::new();

        registry.register("collect_input", Arc::new(PromptInput::new("user_input")));
        registry.register("select_file", Arc::new(PromptInput::new("file_path")));

        for task in LlmTask::ALL {
            registry.register(
                task.action_name(),
                Arc::new(LlmAction {
                    llm: Arc::clone(&llm),
                    task: *task,
                }),
            );
        }

        registry.register_fn("format_report", format_report);
        registry.register_fn("search_offline_db", search_offline_db);
        registry.register("rag_search", Arc::new(RagSearch));
        registry.register("copy_to_clipboard", Arc::new(CopyToClipboard));

        registry
    }
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn text_var(variables: &Variables, key: &str) -> Option<String> {
    variables
        .get(key)
        .filter(|v| !v.is_null())
        .map(value_to_text)
        .filter(|s| !s.is_empty())
}

/// Reads one line from stdin unless the target variable is already bound
///
/// `params.var_name` overrides the target variable.
struct PromptInput {
    default_var: &'static str,
}

impl PromptInput {
    fn new(default_var: &'static str) -> Self {
        Self { default_var }
    }
}

#[async_trait]
impl ActionHandler for PromptInput {
    async fn call(
        &self,
        prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        let var_name = str_param(params, "var_name")
            .unwrap_or(self.default_var)
            .to_string();

        if let Some(existing) = variables.get(&var_name).filter(|v| !v.is_null()) {
            debug!("{} already set, not prompting", var_name);
            return Ok(json!({ var_name: existing }));
        }

        let question = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut stderr = std::io::stderr();
            write!(stderr, "{}: ", question)?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read from stdin")?;
            Ok(line.trim_end_matches(['\r', '\n']).to_string())
        })
        .await
        .context("Input task panicked")??;

        Ok(json!({ var_name: answer }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmTask {
    Outline,
    Section,
    Summarize,
    Email,
    AnalyzeDocument,
}

impl LlmTask {
    const ALL: &'static [LlmTask] = &[
        LlmTask::Outline,
        LlmTask::Section,
        LlmTask::Summarize,
        LlmTask::Email,
        LlmTask::AnalyzeDocument,
    ];

    fn action_name(&self) -> &'static str {
        match self {
            LlmTask::Outline => "generate_outline",
            LlmTask::Section => "write_section",
            LlmTask::Summarize => "summarize",
            LlmTask::Email => "generate_email",
            LlmTask::AnalyzeDocument => "analyze_document",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            LlmTask::Outline => {
                "You are a helpful assistant that creates clear, structured outlines for academic papers."
            }
            LlmTask::Section => {
                "You are a helpful assistant that writes clear, well-structured academic content."
            }
            LlmTask::Summarize => {
                "You are a helpful assistant that creates clear, concise summaries."
            }
            LlmTask::Email => {
                "You are a professional email writer. Create clear, concise, professional emails."
            }
            LlmTask::AnalyzeDocument => {
                "You are a document analysis expert. Provide clear, actionable insights."
            }
        }
    }
}

/// User prompt sent to the backend for `task`
fn build_request(
    task: LlmTask,
    params: &Map<String, Value>,
    variables: &Variables,
) -> Result<String> {
    let prompt = match task {
        LlmTask::Outline => {
            let topic = text_var(variables, "topic").unwrap_or_else(|| "the given topic".to_string());
            format!("Create a detailed outline for a paper about: {}", topic)
        }
        LlmTask::Section => {
            let section_type = str_param(params, "section_type").unwrap_or("section");
            let topic = text_var(variables, "topic").unwrap_or_default();
            let outline = text_var(variables, "outline").unwrap_or_default();
            format!(
                "Write the {} for a paper about '{}'.\n\nOutline:\n{}",
                section_type, topic, outline
            )
        }
        LlmTask::Summarize => format!(
            "Summarize the following information:\n\n{}",
            summary_source(variables)
        ),
        LlmTask::Email => {
            let email_type = text_var(variables, "email_type").unwrap_or_else(|| "request".to_string());
            let key_points = text_var(variables, "key_points").unwrap_or_default();
            format!(
                "Write a professional {} email that covers these points:\n{}",
                email_type, key_points
            )
        }
        LlmTask::AnalyzeDocument => {
            let analysis_type =
                text_var(variables, "analysis_type").unwrap_or_else(|| "summary".to_string());
            let path = text_var(variables, "file_path")
                .ok_or_else(|| anyhow!("No file_path set for analyze_document"))?;
            let content = read_document(Path::new(&path))?;
            format!("Analyze this document for {}:\n\n{}", analysis_type, content)
        }
    };
    Ok(prompt)
}

fn summary_source(variables: &Variables) -> String {
    if let Some(results) = variables
        .get("search_results")
        .and_then(Value::as_array)
        .filter(|r| !r.is_empty())
    {
        let lines: Vec<String> = results
            .iter()
            .map(|r| {
                format!(
                    "- {}: {}",
                    r.get("file").and_then(Value::as_str).unwrap_or("file"),
                    r.get("excerpt").and_then(Value::as_str).unwrap_or("")
                )
            })
            .collect();
        return format!("Search results:\n{}", lines.join("\n"));
    }
    if let Some(analysis) = text_var(variables, "analysis") {
        return format!("Analysis:\n{}", analysis);
    }
    if let Some(help) = text_var(variables, "help_content") {
        return format!("Help content:\n{}", help);
    }
    Value::Object(variables.clone()).to_string()
}

fn read_document(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    Ok(content.chars().take(MAX_DOCUMENT_CHARS).collect())
}

struct LlmAction {
    llm: Arc<WorkflowLlm>,
    task: LlmTask,
}

#[async_trait]
impl ActionHandler for LlmAction {
    async fn call(
        &self,
        _prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        let request = build_request(self.task, params, variables)?;
        let reply = self
            .llm
            .generate(&request, Some(self.task.system_prompt()))
            .await?;

        let result = match self.task {
            LlmTask::Outline => json!({ "outline": reply }),
            LlmTask::Section => {
                let section_type = str_param(params, "section_type").unwrap_or("section");
                let mut map = Map::new();
                map.insert(format!("{}_content", section_type), Value::String(reply.clone()));
                map.insert("section".to_string(), Value::String(reply));
                Value::Object(map)
            }
            LlmTask::Summarize => json!({ "summary": reply }),
            LlmTask::Email => json!({ "email": reply }),
            LlmTask::AnalyzeDocument => json!({ "analysis": reply }),
        };
        Ok(result)
    }
}

fn format_report(_prompt: &str, _params: &Map<String, Value>, variables: &Variables) -> Result<Value> {
    let analysis =
        text_var(variables, "analysis").unwrap_or_else(|| "No analysis available".to_string());
    Ok(json!({ "report": format!("# Document Analysis Report\n\n{}", analysis) }))
}

fn search_offline_db(
    _prompt: &str,
    _params: &Map<String, Value>,
    variables: &Variables,
) -> Result<Value> {
    let game = text_var(variables, "game_name").unwrap_or_else(|| "Unknown Game".to_string());
    let help_type = text_var(variables, "help_type").unwrap_or_else(|| "tips".to_string());

    let help = match help_type.to_lowercase().as_str() {
        "tips" => format!("Tips for {}: Use stealth, collect items, save often.", game),
        "codes" => format!("Cheat codes for {}: IDDQD, IDKFA", game),
        "walkthrough" => format!(
            "Walkthrough for {}: Complete level 1, then level 2...",
            game
        ),
        _ => "No help available".to_string(),
    };
    Ok(json!({ "help_content": help }))
}

/// Case-insensitive keyword search over local text files
///
/// Root is `params.path`, `params.search_dir` or the `search_dir` variable,
/// defaulting to the working directory. Honors `.gitignore`.
struct RagSearch;

impl RagSearch {
    fn root(params: &Map<String, Value>, variables: &Variables) -> PathBuf {
        str_param(params, "path")
            .or_else(|| str_param(params, "search_dir"))
            .map(PathBuf::from)
            .or_else(|| text_var(variables, "search_dir").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn search(root: &Path, query: &str, max_results: usize) -> Vec<Value> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(usize, Value)> = Vec::new();
        for entry in WalkBuilder::new(root).build().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if entry
                .metadata()
                .map(|m| m.len() > MAX_SEARCH_FILE_BYTES)
                .unwrap_or(true)
            {
                continue;
            }
            // Binary or non-UTF-8 files fail here and are skipped
            let Ok(text) = std::fs::read_to_string(path) else {
                continue;
            };

            let lower = text.to_lowercase();
            let score: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
            if score == 0 {
                continue;
            }

            let rel = path.strip_prefix(root).unwrap_or(path);
            hits.push((
                score,
                json!({
                    "file": rel.display().to_string(),
                    "excerpt": excerpt(&text, &terms),
                    "score": score,
                }),
            ));
        }

        hits.sort_by(|a, b| b.0.cmp(&a.0));
        hits.into_iter().take(max_results).map(|(_, v)| v).collect()
    }
}

/// The line holding the first matching term, shortened
fn excerpt(text: &str, terms: &[String]) -> String {
    let line = text
        .lines()
        .find(|line| {
            let lower = line.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .unwrap_or("");
    truncate(line.trim(), EXCERPT_CHARS)
}

#[async_trait]
impl ActionHandler for RagSearch {
    async fn call(
        &self,
        prompt: &str,
        params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        let query = text_var(variables, "query").unwrap_or_else(|| prompt.to_string());
        let root = Self::root(params, variables);
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|m| m as usize)
            .unwrap_or(DEFAULT_MAX_SEARCH_RESULTS);

        if !root.is_dir() {
            return Err(anyhow!("Search directory {} does not exist", root.display()));
        }

        debug!(query = %query, root = %root.display(), "rag_search");
        let results = tokio::task::spawn_blocking(move || Self::search(&root, &query, max_results))
            .await
            .context("Search task panicked")?;

        info!("rag_search found {} results", results.len());
        Ok(json!({ "num_results": results.len(), "search_results": results }))
    }
}

#[cfg(target_os = "macos")]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("pbcopy", &[])];
#[cfg(windows)]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("clip", &[])];
#[cfg(not(any(target_os = "macos", windows)))]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// Copies `email`, `summary` or `report` (first one set) to the system clipboard
struct CopyToClipboard;

impl CopyToClipboard {
    async fn pipe_to(program: &Path, args: &[&str], content: &str) -> Result<bool> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await?;
        }
        Ok(child.wait().await?.success())
    }
}

#[async_trait]
impl ActionHandler for CopyToClipboard {
    async fn call(
        &self,
        _prompt: &str,
        _params: &Map<String, Value>,
        variables: &Variables,
    ) -> Result<Value> {
        let content = ["email", "summary", "report"]
            .iter()
            .find_map(|key| text_var(variables, key))
            .unwrap_or_default();

        for (name, args) in CLIPBOARD_COMMANDS {
            let Some(program) = find_executable(name) else {
                continue;
            };
            match Self::pipe_to(&program, args, &content).await {
                Ok(true) => return Ok(json!({ "copied": true })),
                Ok(false) => debug!("{} exited with failure", name),
                Err(e) => debug!("{} failed: {}", name, e),
            }
        }

        warn!("No clipboard tool available; content not copied");
        Ok(json!({ "copied": false }))
    }
}
