//! Workflow discovery in a definitions directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WORKFLOW_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Listing entry for one workflow file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

#[derive(Deserialize)]
struct Header {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Lists workflow files in `dir`, sorted by name
///
/// A missing directory yields an empty list. Files that cannot be read or
/// parsed are skipped with a warning.
pub fn list_available_workflows(dir: &Path) -> Vec<WorkflowSummary> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read workflow directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut workflows: Vec<WorkflowSummary> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_workflow_extension(path))
        .filter_map(|path| summarize(&path))
        .collect();

    workflows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    workflows
}

/// Case-insensitive lookup by listing name
pub fn find_workflow(dir: &Path, name: &str) -> Option<WorkflowSummary> {
    let needle = name.trim().to_lowercase();
    list_available_workflows(dir)
        .into_iter()
        .find(|wf| wf.name.to_lowercase() == needle)
}

fn has_workflow_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WORKFLOW_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn summarize(path: &Path) -> Option<WorkflowSummary> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };

    let header: Header = match serde_yaml::from_str(&source) {
        Ok(header) => header,
        Err(e) => {
            warn!("Skipping unparseable workflow {}: {}", path.display(), e);
            return None;
        }
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Some(WorkflowSummary {
        name: header.name.filter(|n| !n.trim().is_empty()).unwrap_or(stem),
        description: header.description.unwrap_or_default(),
        path: path.to_path_buf(),
    })
}
