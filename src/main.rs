use lmapp::cli::commands::{CliArgs, Commands};
use lmapp::cli::handlers::{
    handle_chat, handle_config, handle_install, handle_status, handle_workflow,
};
use lmapp::util::logging::{self, parse_level, LoggingConfig};
use lmapp::{LmappConfig, VERSION};

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("lmapp v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let config = match LmappConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let exit_code = match &args.command {
        Commands::Workflow(workflow_args) => handle_workflow(workflow_args, &config).await,
        Commands::Status(status_args) => handle_status(status_args, &config).await,
        Commands::Install(install_args) => handle_install(install_args, &config).await,
        Commands::Chat(chat_args) => handle_chat(chat_args, &config).await,
        Commands::Config(config_args) => handle_config(config_args, &config).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = if args.debug {
        LoggingConfig::debug()
    } else {
        LoggingConfig::from_env()
    };

    if let Some(level_str) = &args.log_level {
        match parse_level(level_str) {
            Some(level) => config.level = level,
            None => eprintln!(
                "Invalid log level '{}', keeping {}. Valid levels: trace, debug, info, warn, error",
                level_str, config.level
            ),
        }
    }

    logging::init_logging(config);
}
