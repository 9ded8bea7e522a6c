//! vault-sync CLI - sync a note-taking vault with a Git remote.
//!
//! Usage:
//!   vault-sync setup -v <vault> -r <url>   - Save config and init the repository
//!   vault-sync sync [-m <message>]         - Commit, rebase onto remote main, push

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vault_sync::{Context, VaultSyncOrchestrator};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let orchestrator = VaultSyncOrchestrator::new(Context {
        config_path: cli.config,
    });

    let result = match cli.command {
        Commands::Setup {
            vault_path,
            repo_url,
        } => cli::commands::setup(&orchestrator, &vault_path, &repo_url),
        Commands::Sync { message } => cli::commands::sync(&orchestrator, message.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vault_sync={}", log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
