//! Error types for vault-sync.
//!
//! Library code returns [`VaultSyncError`]; every failure reported by libgit2
//! is wrapped in a [`GitError`] that records which operation failed and a
//! [`FailureKind`] derived from libgit2's error code and class.

use git2::{ErrorClass, ErrorCode};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The git operation that was running when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    Open,
    Init,
    Remote,
    Untrack,
    Stage,
    Checkout,
    Commit,
    Fetch,
    Rebase,
    Push,
}

impl fmt::Display for GitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GitOp::Open => "open",
            GitOp::Init => "init",
            GitOp::Remote => "remote setup",
            GitOp::Untrack => "untrack",
            GitOp::Stage => "stage",
            GitOp::Checkout => "checkout",
            GitOp::Commit => "commit",
            GitOp::Fetch => "fetch",
            GitOp::Rebase => "rebase",
            GitOp::Push => "push",
        };
        f.write_str(name)
    }
}

/// Structured category of a git failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RefNotFound,
    Conflict,
    Authentication,
    Network,
    Rejected,
    Other,
}

impl FailureKind {
    /// Classify a libgit2 error from its code and class.
    pub fn classify(err: &git2::Error) -> Self {
        match err.code() {
            ErrorCode::Auth | ErrorCode::Certificate => return FailureKind::Authentication,
            ErrorCode::Conflict | ErrorCode::MergeConflict | ErrorCode::Unmerged => {
                return FailureKind::Conflict
            }
            ErrorCode::NotFastForward => return FailureKind::Rejected,
            ErrorCode::NotFound if err.class() == ErrorClass::Reference => {
                return FailureKind::RefNotFound
            }
            _ => {}
        }

        match err.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh => {
                FailureKind::Network
            }
            _ => FailureKind::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RefNotFound => "ref not found",
            FailureKind::Conflict => "conflict",
            FailureKind::Authentication => "authentication failed",
            FailureKind::Network => "network failure",
            FailureKind::Rejected => "rejected by remote",
            FailureKind::Other => "failed",
        };
        f.write_str(name)
    }
}

/// A libgit2 failure tagged with the operation that produced it.
#[derive(Debug, Error)]
#[error("{op} {kind}: {source}")]
pub struct GitError {
    pub op: GitOp,
    pub kind: FailureKind,
    #[source]
    pub source: git2::Error,
}

impl GitError {
    pub fn new(op: GitOp, source: git2::Error) -> Self {
        Self {
            op,
            kind: FailureKind::classify(&source),
            source,
        }
    }

    /// Build an error with an explicit kind, for outcomes libgit2 reports
    /// through callbacks rather than return codes.
    pub fn with_kind(op: GitOp, kind: FailureKind, message: &str) -> Self {
        Self {
            op,
            kind,
            source: git2::Error::from_str(message),
        }
    }
}

/// Tag raw `git2` results with the operation being performed.
pub trait GitResultExt<T> {
    fn during(self, op: GitOp) -> Result<T, GitError>;
}

impl<T> GitResultExt<T> for Result<T, git2::Error> {
    fn during(self, op: GitOp) -> Result<T, GitError> {
        self.map_err(|e| GitError::new(op, e))
    }
}

/// Root cause of a repository bootstrap failure.
#[derive(Debug, Error)]
pub enum InitCause {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Every failure surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum VaultSyncError {
    #[error("Error: Vault path {} does not exist!", .0.display())]
    PathNotFound(PathBuf),

    #[error("Error: Cannot access vault path {}: {source}", path.display())]
    VaultAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error: Please run setup first! (no VAULT_PATH / REPO_URL in {})", .0.display())]
    ConfigurationMissing(PathBuf),

    #[error("Error reading configuration {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Error writing configuration {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Error initializing repository {}: {source}", path.display())]
    RepositoryInit {
        path: PathBuf,
        #[source]
        source: InitCause,
    },

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Error during sync: {context}: {source}")]
    Sync {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl VaultSyncError {
    pub(crate) fn init(path: impl Into<PathBuf>, cause: impl Into<InitCause>) -> Self {
        VaultSyncError::RepositoryInit {
            path: path.into(),
            source: cause.into(),
        }
    }

    pub(crate) fn sync_io(context: impl Into<String>, source: io::Error) -> Self {
        VaultSyncError::Sync {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = VaultSyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code_and_class() {
        let auth = git2::Error::new(ErrorCode::Auth, ErrorClass::Net, "denied");
        assert_eq!(FailureKind::classify(&auth), FailureKind::Authentication);

        let net = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "unreachable");
        assert_eq!(FailureKind::classify(&net), FailureKind::Network);

        let missing = git2::Error::new(ErrorCode::NotFound, ErrorClass::Reference, "no main");
        assert_eq!(FailureKind::classify(&missing), FailureKind::RefNotFound);

        let conflict = git2::Error::new(ErrorCode::MergeConflict, ErrorClass::Merge, "conflict");
        assert_eq!(FailureKind::classify(&conflict), FailureKind::Conflict);

        let behind = git2::Error::new(ErrorCode::NotFastForward, ErrorClass::Reference, "behind");
        assert_eq!(FailureKind::classify(&behind), FailureKind::Rejected);

        let other = git2::Error::new(ErrorCode::NotFound, ErrorClass::Odb, "object");
        assert_eq!(FailureKind::classify(&other), FailureKind::Other);
    }

    #[test]
    fn test_messages_carry_category_prefix() {
        let git = VaultSyncError::from(GitError::with_kind(
            GitOp::Push,
            FailureKind::Rejected,
            "non-fast-forward",
        ));
        assert!(git.to_string().starts_with("Git error: push rejected by remote"));

        let missing = VaultSyncError::ConfigurationMissing(PathBuf::from(".env"));
        assert!(missing.to_string().contains("run setup first"));

        let init = VaultSyncError::init("/vault", io::Error::other("boom"));
        assert!(init.to_string().starts_with("Error initializing repository"));
    }
}
