//! Setup and sync flows for a vault.
//!
//! Setup: validate path -> save config -> init/open repo.
//! Sync:  shelve workspace -> stage -> branch -> commit -> reconcile -> push -> restore.

use super::git::{GitSync, ReconcileOutcome, Untracked, ORIGIN};
use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::error::{InitCause, Result, VaultSyncError};
use crate::workspace::{self, Shelf};
use chrono::Local;
use git2::Oid;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Explicit per-invocation state.
#[derive(Debug, Clone)]
pub struct Context {
    /// Location of the key-value config file
    pub config_path: PathBuf,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Commit created by this sync, with its message
    pub commit: Option<(Oid, String)>,
    /// Whether the workspace-state file was shelved and restored
    pub shelved_workspace: bool,
    pub reconcile: ReconcileOutcome,
    /// Whether the final push ran (it is folded into a first publish)
    pub pushed: bool,
}

/// Runs setup and sync for one vault.
pub struct VaultSyncOrchestrator {
    ctx: Context,
}

impl VaultSyncOrchestrator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Validate the vault, persist the config and bootstrap the repository.
    pub fn setup(&self, vault_path: &Path, remote_url: &str) -> Result<Config> {
        let vault_path = vault_path.canonicalize().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                VaultSyncError::PathNotFound(vault_path.to_path_buf())
            } else {
                VaultSyncError::VaultAccess {
                    path: vault_path.to_path_buf(),
                    source,
                }
            }
        })?;

        let config = Config::new(vault_path, remote_url);
        config.save(&self.ctx.config_path)?;
        debug!("[setup] Config written to {}", self.ctx.config_path.display());

        self.ensure_repository(&config.vault_path, &config.remote_url)?;
        Ok(config)
    }

    /// Load the saved config and sync the vault it points to.
    pub fn sync(&self, message: Option<&str>) -> Result<SyncReport> {
        let config = Config::load(&self.ctx.config_path)?;
        let git = self.ensure_repository(&config.vault_path, &config.remote_url)?;
        sync_changes(&git, message)
    }

    /// Open the repository at `vault_path`, or create it with `origin` set to
    /// `remote_url`, and keep the workspace-state file out of version control.
    pub fn ensure_repository(&self, vault_path: &Path, remote_url: &str) -> Result<GitSync> {
        let init_err = |cause: InitCause| VaultSyncError::init(vault_path, cause);

        let git = if GitSync::exists_at(vault_path) {
            GitSync::open(vault_path).map_err(|e| init_err(e.into()))?
        } else {
            info!("Initializing new Git repository in {}", vault_path.display());
            GitSync::init(vault_path).map_err(|e| init_err(e.into()))?
        };

        if git
            .ensure_remote(ORIGIN, remote_url)
            .map_err(|e| init_err(e.into()))?
        {
            debug!("[setup] Registered remote {} -> {}", ORIGIN, remote_url);
        }

        workspace::ensure_ignore_rule(vault_path).map_err(|e| init_err(e.into()))?;

        match git
            .remove_from_index(workspace::workspace_file_rel())
            .map_err(|e| init_err(e.into()))?
        {
            Untracked::WasTracked => info!("Removed workspace.json from Git tracking"),
            Untracked::NotTracked => {}
        }

        Ok(git)
    }
}

/// Commit message for this sync: the caller's, or a timestamped default.
pub fn commit_message(message: Option<&str>) -> String {
    match message {
        Some(msg) if !msg.trim().is_empty() => msg.to_string(),
        _ => format!("Vault sync: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
    }
}

/// Run the sync sequence on an open repository.
///
/// The workspace-state file is restored even when a step fails; the step's
/// error is the one returned.
pub fn sync_changes(git: &GitSync, message: Option<&str>) -> Result<SyncReport> {
    let vault_dir = git.workdir()?.to_path_buf();
    let shelf = Shelf::new(&vault_dir, git.repository().path());

    git.abort_stale_rebase()?;
    shelf
        .recover()
        .map_err(|e| VaultSyncError::sync_io("recovering shelved workspace.json", e))?;

    let shelved = shelf
        .shelve()
        .map_err(|e| VaultSyncError::sync_io("shelving workspace.json", e))?;

    let result = run_steps(git, message, shelved);

    let restored = if shelved {
        info!("Restoring workspace.json changes...");
        shelf
            .restore()
            .map_err(|e| VaultSyncError::sync_io("restoring workspace.json", e))
    } else {
        Ok(())
    };

    let report = result?;
    restored?;
    Ok(report)
}

fn run_steps(git: &GitSync, message: Option<&str>, shelved: bool) -> Result<SyncReport> {
    git.stage_all(workspace::workspace_file_rel())?;

    let message = commit_message(message);
    git.ensure_main_branch()?;

    let commit = if git.has_staged_changes()? {
        let id = git.commit(&message)?;
        info!("Changes committed successfully");
        Some((id, message))
    } else {
        debug!("[sync] Nothing to commit");
        None
    };

    info!("Pulling changes from remote...");
    let reconcile = match git.fetch_main()? {
        Some(upstream) => {
            let outcome = git.integrate(upstream)?;
            debug!("[sync] Reconcile outcome: {:?}", outcome);
            info!("Pushing changes to remote...");
            outcome
        }
        None => {
            info!("Initializing remote repository...");
            ReconcileOutcome::FirstPublish
        }
    };

    git.push_main()?;
    git.set_upstream()?;

    Ok(SyncReport {
        commit,
        shelved_workspace: shelved,
        reconcile,
        pushed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_custom_message_used_verbatim() {
        assert_eq!(commit_message(Some("Fix typo")), "Fix typo");
    }

    #[test]
    fn test_default_message_has_timestamp() {
        for msg in [commit_message(None), commit_message(Some("   "))] {
            let stamp = msg
                .strip_prefix("Vault sync: ")
                .expect("default message prefix");
            assert!(NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
        }
    }

    #[test]
    fn test_setup_rejects_missing_path() {
        let orchestrator = VaultSyncOrchestrator::new(Context::default());
        let err = orchestrator
            .setup(Path::new("/definitely/not/a/vault"), "https://example.com/v.git")
            .unwrap_err();
        assert!(matches!(err, VaultSyncError::PathNotFound(_)));
    }

    #[test]
    fn test_setup_reports_unreadable_path_as_is() -> anyhow::Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let file = temp_dir.path().join("note.md");
        std::fs::write(&file, "not a directory")?;

        let orchestrator = VaultSyncOrchestrator::new(Context {
            config_path: temp_dir.path().join(".env"),
        });
        let err = orchestrator
            .setup(&file.join("vault"), "https://example.com/v.git")
            .unwrap_err();

        match &err {
            VaultSyncError::VaultAccess { path, source } => {
                assert_eq!(path, &file.join("vault"));
                assert_ne!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Error: Cannot access vault path"));
        assert!(!temp_dir.path().join(".env").exists());
        Ok(())
    }
}
