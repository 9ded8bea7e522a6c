//! Sync module - keeps a vault in step with its remote through Git.
//!
//! This module contains:
//! - Git operations (init, stage, commit, fetch, rebase, push)
//! - The setup / sync orchestration built on top of them

pub mod git;
pub mod orchestrator;

pub use git::{GitSync, ReconcileOutcome};
pub use orchestrator::{Context, SyncReport, VaultSyncOrchestrator};
