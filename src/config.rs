//! Config module - persists the vault location and remote URL.
//!
//! The file is a plain `KEY=VALUE` list (`.env` in the working directory by
//! default) with two keys:
//! - `VAULT_PATH`: absolute path of the vault
//! - `REPO_URL`: URL of the remote repository
//!
//! Non-empty values already present in the process environment win over the
//! file, the way dotenv loaders behave.

use crate::error::{Result, VaultSyncError};
use ini::Ini;
use std::io;
use std::path::{Path, PathBuf};

pub const VAULT_PATH_KEY: &str = "VAULT_PATH";
pub const REPO_URL_KEY: &str = "REPO_URL";

/// Default config file name, resolved against the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".env";

/// Persisted sync configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub vault_path: PathBuf,
    pub remote_url: String,
}

impl Config {
    pub fn new(vault_path: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            vault_path: vault_path.into(),
            remote_url: remote_url.into(),
        }
    }

    /// Write the config file, replacing any previous content.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        ini.with_general_section()
            .set(VAULT_PATH_KEY, self.vault_path.to_string_lossy())
            .set(REPO_URL_KEY, self.remote_url.as_str());

        ini.write_to_file(path)
            .map_err(|source| VaultSyncError::ConfigWrite {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Load the config from `path`, letting the process environment override it.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load the config with an explicit environment lookup.
    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match Ini::load_from_file(path) {
            Ok(ini) => Some(ini),
            Err(ini::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(VaultSyncError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let lookup = |key: &str| -> Option<String> {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| {
                    file.as_ref()
                        .and_then(|ini| ini.general_section().get(key))
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty())
                })
        };

        match (lookup(VAULT_PATH_KEY), lookup(REPO_URL_KEY)) {
            (Some(vault_path), Some(remote_url)) => Ok(Self::new(vault_path, remote_url)),
            _ => Err(VaultSyncError::ConfigurationMissing(path.to_path_buf())),
        }
    }
}
