pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{ChatArgs, CliArgs, Commands, ConfigArgs, InstallArgs, StatusArgs, WorkflowArgs};
pub use output::{OutputFormat, OutputFormatter};
