//! Output formatting for status, configuration and workflow listings
//!
//! JSON and YAML are meant for scripts; the human format renders tables.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use serde_json::json;

use crate::backend::{BackendInfo, BackendStatus, SystemReport};
use crate::config::LmappConfig;
use crate::workflow::WorkflowSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_config(&self, config: &LmappConfig) -> Result<String> {
        let map = config.to_display_map();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&map).context("Failed to serialize config to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(&map).context("Failed to serialize config to YAML")
            }
            OutputFormat::Human => {
                let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
                let mut out = String::from("lmapp configuration\n\n");
                for (key, value) in &map {
                    out.push_str(&format!("  {:width$}  {}\n", key, value, width = width));
                }
                Ok(out)
            }
        }
    }

    pub fn format_status(&self, report: &SystemReport, backends: &[BackendInfo]) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&json!({ "system": report, "backends": backends }))
                    .context("Failed to serialize status to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(&json!({ "system": report, "backends": backends }))
                    .context("Failed to serialize status to YAML")
            }
            OutputFormat::Human => Ok(format_status_human(report, backends)),
        }
    }

    pub fn format_workflows(&self, workflows: &[WorkflowSummary]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(workflows)
                .context("Failed to serialize workflows to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(workflows).context("Failed to serialize workflows to YAML")
            }
            OutputFormat::Human => Ok(format_workflows_human(workflows)),
        }
    }
}

fn format_status_human(report: &SystemReport, backends: &[BackendInfo]) -> String {
    let mut out = String::new();
    out.push_str("System\n");
    out.push_str(&format!("  OS:        {}\n", report.os_name));
    out.push_str(&format!(
        "  RAM:       {:.1}GB total, {:.1}GB available\n",
        report.ram_gb(),
        report.available_ram_gb()
    ));
    match report.free_disk_gb() {
        Some(free) => out.push_str(&format!("  Disk:      {:.1}GB free\n", free)),
        None => out.push_str("  Disk:      unknown\n"),
    }
    out.push_str(&format!("  CPU cores: {}\n", report.cpu_cores));
    for failure in report.failures() {
        out.push_str(&format!("  ! {}\n", failure));
    }
    out.push('\n');

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Backend").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Version"),
        ]);

    for info in backends {
        let color = match info.status {
            BackendStatus::Running => Color::Green,
            BackendStatus::Installed => Color::Yellow,
            BackendStatus::NotInstalled => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&info.display_name),
            Cell::new(info.status).fg(color),
            Cell::new(info.version.as_deref().unwrap_or("-")),
        ]);
    }

    out.push_str(&table.to_string());
    out.push('\n');
    out
}

fn format_workflows_human(workflows: &[WorkflowSummary]) -> String {
    if workflows.is_empty() {
        return "No workflows found.\n".to_string();
    }

    let mut out = String::from("Available workflows:\n\n");
    for wf in workflows {
        out.push_str(&format!("  {}\n", wf.name));
        if !wf.description.is_empty() {
            out.push_str(&format!("    {}\n", wf.description));
        }
        out.push_str(&format!("    Path: {}\n\n", wf.path.display()));
    }
    out
}
