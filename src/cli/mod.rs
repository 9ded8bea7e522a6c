//! CLI definitions and command implementations for vault-sync.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vault-sync - Sync your note vault with a Git remote
#[derive(Parser)]
#[command(name = "vault-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file holding VAULT_PATH and REPO_URL
    #[arg(long, global = true, default_value = vault_sync::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Setup the vault for syncing
    Setup {
        /// Path to your vault
        #[arg(short = 'v', long)]
        vault_path: PathBuf,

        /// Remote repository URL
        #[arg(short = 'r', long)]
        repo_url: String,
    },

    /// Sync your vault with the remote
    Sync {
        /// Custom commit message
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setup_short_flags() {
        let cli = Cli::try_parse_from([
            "vault-sync",
            "setup",
            "-v",
            "/notes",
            "-r",
            "git@github.com:me/notes.git",
        ])
        .unwrap();

        match cli.command {
            Commands::Setup {
                vault_path,
                repo_url,
            } => {
                assert_eq!(vault_path, PathBuf::from("/notes"));
                assert_eq!(repo_url, "git@github.com:me/notes.git");
            }
            _ => panic!("expected setup"),
        }
        assert_eq!(cli.config, PathBuf::from(".env"));
    }

    #[test]
    fn test_parse_sync_message() {
        let cli = Cli::try_parse_from(["vault-sync", "sync", "--message", "Fix typo"]).unwrap();
        match cli.command {
            Commands::Sync { message } => assert_eq!(message.as_deref(), Some("Fix typo")),
            _ => panic!("expected sync"),
        }

        let cli = Cli::try_parse_from(["vault-sync", "sync"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { message: None }));
    }

    #[test]
    fn test_setup_requires_both_flags() {
        assert!(Cli::try_parse_from(["vault-sync", "setup", "-v", "/notes"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
