//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, builds the tokio
//! runtime and the orchestrator, dispatches to a command and handles all
//! error output. `main.rs` only maps the returned exit code.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use forge_config::{CliArgs, Config};
use forge_engine::Orchestrator;
use forge_utils::error::ForgeError;
use forge_utils::exit_codes::ExitCode;
use forge_utils::logging::init_tracing;
use forge_utils::types::DocumentId;

use super::args::{Cli, Commands};
use super::chat;
use super::commands::{self, GenerateOptions};

/// Main CLI execution function.
///
/// Prints everything itself, including errors, and returns the exit code to
/// use on failure.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Warning: logging is unavailable: {e}");
    }

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        model: cli.model.clone(),
        worker_model: cli.worker_model.clone(),
        flow: cli.flow.clone(),
        llm_provider: cli.llm_provider.clone(),
        retrieval_enabled: if cli.retrieval {
            Some(true)
        } else if cli.no_retrieval {
            Some(false)
        } else {
            None
        },
        retrieval_endpoint: cli.retrieval_endpoint.clone(),
        artifacts_log: cli.artifacts_log.clone(),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return Err(ExitCode::CONFIG_ERROR);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(dispatch(cli.command, &config));
    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => Err(report(&err)),
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Config { json } => commands::execute_config_command(config, json),
        Commands::Chat { document, name } => {
            let orchestrator = Arc::new(Orchestrator::from_config(config)?);
            chat::execute_chat_command(orchestrator, DocumentId::from(document), name).await
        }
        Commands::Generate {
            request,
            document,
            branch,
            image_base64,
            image_mime,
            output,
            json,
        } => {
            let orchestrator = Arc::new(Orchestrator::from_config(config)?);
            let options = GenerateOptions {
                request,
                document,
                branch,
                image_base64,
                image_mime,
                output,
                json,
            };
            commands::execute_generate_command(orchestrator, options).await
        }
    }
}

/// Print `err` for a human and pick the exit code.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ForgeError>() {
        Some(forge) => {
            eprintln!("{}", forge.display_for_user());
            forge.to_exit_code()
        }
        None => {
            eprintln!("Error: {err:#}");
            ExitCode::INTERNAL
        }
    }
}
