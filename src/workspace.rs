//! The vault's workspace-state file.
//!
//! `.obsidian/workspace.json` holds editor layout state that changes on every
//! session and must never be versioned. This module owns its ignore rule and
//! the shelf that moves it out of the working tree while a sync runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Path of the workspace-state file relative to the vault root.
pub const WORKSPACE_FILE: &str = ".obsidian/workspace.json";

/// Ignore-rules file at the vault root.
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Directory inside `.git/` where shelved files are kept.
const SHELF_DIR: &str = "vault-sync";
const SHELVED_NAME: &str = "workspace.json";

pub fn workspace_file_rel() -> &'static Path {
    Path::new(WORKSPACE_FILE)
}

/// Make sure `.gitignore` contains the workspace-state rule.
///
/// Returns `true` if the file was created or modified.
pub fn ensure_ignore_rule(vault_dir: &Path) -> io::Result<bool> {
    let gitignore_path = vault_dir.join(GITIGNORE_FILE);

    if !gitignore_path.exists() {
        fs::write(&gitignore_path, format!("{}\n", WORKSPACE_FILE))?;
        debug!("[workspace] Created {}", gitignore_path.display());
        return Ok(true);
    }

    let content = fs::read_to_string(&gitignore_path)?;
    if content.lines().any(|line| line.trim() == WORKSPACE_FILE) {
        return Ok(false);
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(WORKSPACE_FILE);
    updated.push('\n');
    fs::write(&gitignore_path, updated)?;
    debug!("[workspace] Appended rule to {}", gitignore_path.display());
    Ok(true)
}

/// Holds the workspace-state file outside the working tree during a sync.
///
/// The file is moved (never read) into `<git dir>/vault-sync/`, so it can be
/// neither staged nor clobbered by a checkout, and moved back afterwards.
#[derive(Debug)]
pub struct Shelf {
    live: PathBuf,
    shelved: PathBuf,
}

impl Shelf {
    pub fn new(vault_dir: &Path, git_dir: &Path) -> Self {
        Self {
            live: vault_dir.join(WORKSPACE_FILE),
            shelved: git_dir.join(SHELF_DIR).join(SHELVED_NAME),
        }
    }

    /// Whether a shelved copy is currently held.
    pub fn is_holding(&self) -> bool {
        self.shelved.exists()
    }

    /// Deal with a shelf left behind by an interrupted run.
    ///
    /// The shelved copy is the user's editor state and always goes back. A
    /// live file next to it was written by a checkout and is replaced.
    pub fn recover(&self) -> io::Result<()> {
        if !self.is_holding() {
            return Ok(());
        }
        if self.live.exists() {
            debug!("[workspace] Replacing {} with shelved copy", self.live.display());
        }
        info!("Restoring workspace.json left over from an interrupted sync...");
        self.restore()
    }

    /// Move the live file onto the shelf. Returns `false` if there was nothing
    /// to shelve.
    pub fn shelve(&self) -> io::Result<bool> {
        if !self.live.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.shelved.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.live, &self.shelved)?;
        info!("Shelving workspace.json changes...");
        Ok(true)
    }

    /// Put the shelved file back, replacing whatever is at the live path.
    pub fn restore(&self) -> io::Result<()> {
        if let Some(parent) = self.live.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.live.exists() {
            fs::remove_file(&self.live)?;
        }
        fs::rename(&self.shelved, &self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    #[test]
    fn test_ignore_rule_created_when_missing() -> Result<()> {
        let temp_dir = TempDir::new()?;

        assert!(ensure_ignore_rule(temp_dir.path())?);

        let content = fs::read_to_string(temp_dir.path().join(GITIGNORE_FILE))?;
        assert_eq!(content, ".obsidian/workspace.json\n");
        Ok(())
    }

    #[test]
    fn test_ignore_rule_appended_once() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join(GITIGNORE_FILE);
        fs::write(&path, "*.tmp")?;

        assert!(ensure_ignore_rule(temp_dir.path())?);
        assert!(!ensure_ignore_rule(temp_dir.path())?);

        let content = fs::read_to_string(&path)?;
        assert_eq!(content, "*.tmp\n.obsidian/workspace.json\n");
        assert_eq!(content.matches(WORKSPACE_FILE).count(), 1);
        Ok(())
    }

    #[test]
    fn test_shelve_and_restore() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let vault = temp_dir.path().join("vault");
        let git_dir = vault.join(".git");
        fs::create_dir_all(vault.join(".obsidian"))?;
        fs::create_dir_all(&git_dir)?;
        fs::write(vault.join(WORKSPACE_FILE), "{\"left\":1}")?;

        let shelf = Shelf::new(&vault, &git_dir);
        assert!(shelf.shelve()?);
        assert!(!vault.join(WORKSPACE_FILE).exists());
        assert!(shelf.is_holding());

        // A checkout may have written a different copy in the meantime.
        fs::write(vault.join(WORKSPACE_FILE), "{\"remote\":1}")?;
        shelf.restore()?;

        assert!(!shelf.is_holding());
        assert_eq!(fs::read_to_string(vault.join(WORKSPACE_FILE))?, "{\"left\":1}");
        Ok(())
    }

    #[test]
    fn test_shelve_without_file_is_noop() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let shelf = Shelf::new(temp_dir.path(), &temp_dir.path().join(".git"));
        assert!(!shelf.shelve()?);
        assert!(!shelf.is_holding());
        Ok(())
    }

    #[test]
    fn test_recover_prefers_shelved_copy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let vault = temp_dir.path();
        let git_dir = vault.join(".git");
        fs::create_dir_all(vault.join(".obsidian"))?;
        fs::write(vault.join(WORKSPACE_FILE), "old")?;

        let shelf = Shelf::new(vault, &git_dir);
        shelf.shelve()?;
        shelf.recover()?;
        assert_eq!(fs::read_to_string(vault.join(WORKSPACE_FILE))?, "old");

        // Interrupted after a checkout wrote the remote's copy.
        shelf.shelve()?;
        fs::write(vault.join(WORKSPACE_FILE), "from remote history")?;
        shelf.recover()?;
        assert!(!shelf.is_holding());
        assert_eq!(fs::read_to_string(vault.join(WORKSPACE_FILE))?, "old");
        Ok(())
    }
}
