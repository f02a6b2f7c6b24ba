//! Helpers for probing and driving external runtimes

use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

use super::error::BackendError;

/// Locates an executable on `PATH`
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let file_name = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

/// Runs `program --version` and extracts the first semantic version found
pub async fn probe_version(program: &Path) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let version = parse_version(&text);
    debug!("{} --version -> {:?}", program.display(), version);
    version
}

pub fn parse_version(text: &str) -> Option<String> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| Regex::new(r"\d+\.\d+(?:\.\d+)?").expect("valid regex"));
    re.find(text).map(|m| m.as_str().to_string())
}

/// Runs a shell pipeline, returning whether it exited successfully
pub async fn run_shell(script: &str) -> Result<bool, BackendError> {
    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };
    debug!("Running: {} {} {}", shell, flag, script);

    let status = Command::new(shell)
        .arg(flag)
        .arg(script)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| BackendError::Process {
            message: format!("Failed to run '{}': {}", script, e),
        })?;
    Ok(status.success())
}

/// Splits a chunked HTTP body into newline-delimited records
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every complete, non-empty line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Returns the trailing line left without a newline
    pub fn finish(&mut self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(text)
    }
}

pub fn parse_json_line<T: DeserializeOwned>(line: &str) -> Result<T, BackendError> {
    serde_json::from_str(line).map_err(|e| BackendError::InvalidResponse {
        message: format!("JSON parse error: {} (line: {})", e, truncate(line, 120)),
    })
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
