//! Command implementations for the vault-sync CLI.
//!
//! - setup: validate the vault, save config, init the repository
//! - sync: stage, commit, rebase onto remote main, push

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use vault_sync::{ReconcileOutcome, SyncReport, VaultSyncOrchestrator};

/// Setup the vault for syncing
pub fn setup(orchestrator: &VaultSyncOrchestrator, vault_path: &Path, repo_url: &str) -> Result<()> {
    let config = orchestrator.setup(vault_path, repo_url)?;

    println!(
        "  {} Vault: {}",
        "✓".green(),
        config.vault_path.display().to_string().white().bold()
    );
    println!("  {} Remote: {}", "✓".green(), config.remote_url.cyan());
    println!(
        "  {} Config saved to {}",
        "✓".green(),
        orchestrator.context().config_path.display().to_string().dimmed()
    );
    println!("{}", "Setup completed successfully! 🎉".green().bold());
    Ok(())
}

/// Sync the configured vault
pub fn sync(orchestrator: &VaultSyncOrchestrator, message: Option<&str>) -> Result<()> {
    let report = orchestrator.sync(message)?;
    print_report(&report);
    println!("{}", "Sync completed successfully! ✨".green().bold());
    Ok(())
}

fn print_report(report: &SyncReport) {
    match &report.commit {
        Some((id, message)) => println!(
            "  {} Committed {} {}",
            "✓".green(),
            id.to_string()[..7].yellow(),
            message
        ),
        None => println!("  {} No local changes to commit", "·".dimmed()),
    }

    let reconcile = match report.reconcile {
        ReconcileOutcome::FirstPublish => "Published main to the remote".to_string(),
        ReconcileOutcome::UpToDate => "Already up to date with the remote".to_string(),
        ReconcileOutcome::FastForwarded => "Fast-forwarded to the remote".to_string(),
        ReconcileOutcome::Rebased { resolved_conflicts: 0 } => {
            "Rebased onto the remote".to_string()
        }
        ReconcileOutcome::Rebased { resolved_conflicts } => format!(
            "Rebased onto the remote, kept local content for {} conflicting path(s)",
            resolved_conflicts
        ),
    };
    println!("  {} {}", "✓".green(), reconcile);

    if report.pushed {
        println!("  {} Pushed to origin/main", "✓".green());
    }
    if report.shelved_workspace {
        println!("  {} Kept local workspace.json out of the sync", "✓".green());
    }
}
