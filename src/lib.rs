//! vault-sync - keep a note-taking vault in sync with a remote Git repository.
//!
//! `setup` records where the vault lives and which remote it belongs to;
//! `sync` stages, commits, rebases onto the remote `main` and pushes.

pub mod config;
pub mod error;
pub mod sync;
pub mod workspace;

pub use config::Config;
pub use error::{FailureKind, GitError, GitOp, VaultSyncError};
pub use sync::{Context, GitSync, ReconcileOutcome, SyncReport, VaultSyncOrchestrator};
