//! Git operations for vault-sync.
//!
//! Uses libgit2 (through the git2 crate) to:
//! - Init or open the vault repository
//! - Stage and commit changes
//! - Fetch, fast-forward or rebase onto the remote `main`
//! - Push to the remote

use crate::error::{FailureKind, GitError, GitOp, GitResultExt};
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, Cred, CredentialType, ErrorCode, FetchOptions, IndexAddOption,
    IndexEntry, IndexMatchedPath, Oid, PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions,
    RepositoryState, Signature,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type GitResult<T> = Result<T, GitError>;

/// The single working branch.
pub const MAIN_BRANCH: &str = "main";

/// The single remote.
pub const ORIGIN: &str = "origin";

const MAIN_REF: &str = "refs/heads/main";
const ORIGIN_MAIN_REF: &str = "refs/remotes/origin/main";

/// Stage bits of `IndexEntry::flags`.
const INDEX_STAGE_MASK: u16 = 0x3000;

/// Credential callback attempts before giving up.
const MAX_AUTH_ATTEMPTS: usize = 3;

/// Identity used when the repository config has no user.name / user.email.
const FALLBACK_NAME: &str = "Vault Sync";
const FALLBACK_EMAIL: &str = "vault-sync@local";

/// How local `main` was brought in line with the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The remote had no `main`; local `main` was pushed and tracked.
    FirstPublish,
    /// Local already contains the remote history.
    UpToDate,
    /// Local was behind and moved to the remote tip.
    FastForwarded,
    /// Local commits were replayed on top of the remote.
    Rebased { resolved_conflicts: usize },
}

/// What `remove_from_index` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Untracked {
    WasTracked,
    NotTracked,
}

/// Git sync engine for a vault
pub struct GitSync {
    repo: Repository,
}

impl GitSync {
    /// Open an existing repository
    pub fn open(vault_dir: &Path) -> GitResult<Self> {
        let repo = Repository::open(vault_dir).during(GitOp::Open)?;
        Ok(Self { repo })
    }

    /// Init a new repository with `main` as the initial head
    pub fn init(vault_dir: &Path) -> GitResult<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(MAIN_BRANCH);

        let repo = Repository::init_opts(vault_dir, &opts).during(GitOp::Init)?;
        Ok(Self { repo })
    }

    /// Whether `vault_dir` already holds git metadata
    pub fn exists_at(vault_dir: &Path) -> bool {
        vault_dir.join(".git").exists()
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn workdir(&self) -> GitResult<&Path> {
        self.repo.workdir().ok_or_else(|| {
            GitError::new(
                GitOp::Open,
                git2::Error::new(
                    ErrorCode::BareRepo,
                    git2::ErrorClass::Repository,
                    "repository has no working directory",
                ),
            )
        })
    }

    /// Point `name` at `url`, creating the remote if needed.
    ///
    /// Returns `true` if the remote was created.
    pub fn ensure_remote(&self, name: &str, url: &str) -> GitResult<bool> {
        match self.repo.find_remote(name) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    info!("Updating remote '{}' to {}", name, url);
                    self.repo.remote_set_url(name, url).during(GitOp::Remote)?;
                }
                Ok(false)
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.repo.remote(name, url).during(GitOp::Remote)?;
                Ok(true)
            }
            Err(e) => Err(GitError::new(GitOp::Remote, e)),
        }
    }

    /// Remove `path` from the index, keeping the file on disk.
    pub fn remove_from_index(&self, path: &Path) -> GitResult<Untracked> {
        let mut index = self.repo.index().during(GitOp::Untrack)?;
        if index.get_path(path, 0).is_none() {
            return Ok(Untracked::NotTracked);
        }

        index.remove_path(path).during(GitOp::Untrack)?;
        index.write().during(GitOp::Untrack)?;
        Ok(Untracked::WasTracked)
    }

    /// Stage all additions, modifications and deletions except `excluded`.
    pub fn stage_all(&self, excluded: &Path) -> GitResult<()> {
        let mut index = self.repo.index().during(GitOp::Stage)?;
        let mut skip_excluded = |path: &Path, _spec: &[u8]| -> i32 {
            if path == excluded {
                1
            } else {
                0
            }
        };

        index
            .add_all(
                ["*"],
                IndexAddOption::DEFAULT,
                Some(&mut skip_excluded as &mut IndexMatchedPath),
            )
            .during(GitOp::Stage)?;
        index
            .update_all(["*"], Some(&mut skip_excluded as &mut IndexMatchedPath))
            .during(GitOp::Stage)?;
        index.write().during(GitOp::Stage)?;
        Ok(())
    }

    /// Whether the index differs from HEAD's tree
    pub fn has_staged_changes(&self) -> GitResult<bool> {
        let index = self.repo.index().during(GitOp::Commit)?;
        let head_tree = match self.head_commit() {
            Some(commit) => Some(commit.tree().during(GitOp::Commit)?),
            None => None,
        };

        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)
            .during(GitOp::Commit)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Put HEAD on `main`, creating the branch from the current HEAD commit if
    /// it does not exist yet. Staged changes are carried over.
    pub fn ensure_main_branch(&self) -> GitResult<()> {
        if self.head_target().as_deref() == Some(MAIN_REF) {
            return Ok(());
        }

        match self.repo.find_branch(MAIN_BRANCH, BranchType::Local) {
            Ok(branch) => {
                let commit = branch
                    .get()
                    .peel_to_commit()
                    .during(GitOp::Checkout)?;
                self.repo
                    .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
                    .during(GitOp::Checkout)?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                info!("Creating {} branch...", MAIN_BRANCH);
                if let Some(head) = self.head_commit() {
                    self.repo
                        .branch(MAIN_BRANCH, &head, false)
                        .during(GitOp::Checkout)?;
                }
            }
            Err(e) => return Err(GitError::new(GitOp::Checkout, e)),
        }

        self.repo.set_head(MAIN_REF).during(GitOp::Checkout)
    }

    /// Create a commit from the index on HEAD
    pub fn commit(&self, message: &str) -> GitResult<Oid> {
        let sig = self.signature()?;

        let mut index = self.repo.index().during(GitOp::Commit)?;
        let tree_id = index.write_tree().during(GitOp::Commit)?;
        let tree = self.repo.find_tree(tree_id).during(GitOp::Commit)?;

        let parent_commit = self.head_commit();
        let parents: Vec<&Commit<'_>> = parent_commit.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .during(GitOp::Commit)
    }

    /// Abort a rebase left behind by an interrupted run.
    ///
    /// Returns `true` if there was one.
    pub fn abort_stale_rebase(&self) -> GitResult<bool> {
        match self.repo.state() {
            RepositoryState::Rebase
            | RepositoryState::RebaseInteractive
            | RepositoryState::RebaseMerge => {
                warn!("Aborting unfinished rebase from a previous sync");
                let mut rebase = self.repo.open_rebase(None).during(GitOp::Rebase)?;
                rebase.abort().during(GitOp::Rebase)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Fetch remote `main` into `refs/remotes/origin/main`.
    ///
    /// Returns `None` when the remote has no `main` yet. The tracking ref is
    /// dropped before fetching, so its presence afterwards reflects the remote.
    pub fn fetch_main(&self) -> GitResult<Option<Oid>> {
        let config = self.repo.config().during(GitOp::Fetch)?;
        let mut remote = self.repo.find_remote(ORIGIN).during(GitOp::Fetch)?;

        if let Ok(mut stale) = self.repo.find_reference(ORIGIN_MAIN_REF) {
            stale.delete().during(GitOp::Fetch)?;
        }

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(remote_callbacks(&config));

        let refspec = format!("+{}:{}", MAIN_REF, ORIGIN_MAIN_REF);
        remote
            .fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)
            .during(GitOp::Fetch)?;

        match self.repo.refname_to_id(ORIGIN_MAIN_REF) {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!("[git] {} has no {}", ORIGIN, MAIN_REF);
                Ok(None)
            }
            Err(e) => Err(GitError::new(GitOp::Fetch, e)),
        }
    }

    /// Bring local `main` in line with the fetched remote tip.
    ///
    /// Diverged histories are rebased; conflicting paths keep the local side.
    pub fn integrate(&self, upstream: Oid) -> GitResult<ReconcileOutcome> {
        let local = match self.head_commit() {
            Some(commit) => commit.id(),
            None => {
                self.fast_forward(upstream)?;
                return Ok(ReconcileOutcome::FastForwarded);
            }
        };

        if local == upstream
            || self
                .repo
                .graph_descendant_of(local, upstream)
                .during(GitOp::Rebase)?
        {
            return Ok(ReconcileOutcome::UpToDate);
        }

        if self
            .repo
            .graph_descendant_of(upstream, local)
            .during(GitOp::Rebase)?
        {
            self.fast_forward(upstream)?;
            return Ok(ReconcileOutcome::FastForwarded);
        }

        let resolved_conflicts = self.rebase_onto(upstream)?;
        Ok(ReconcileOutcome::Rebased { resolved_conflicts })
    }

    /// Move `main` to `target`, updating the working tree first
    fn fast_forward(&self, target: Oid) -> GitResult<()> {
        let commit = self.repo.find_commit(target).during(GitOp::Checkout)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
            .during(GitOp::Checkout)?;
        self.repo
            .reference(MAIN_REF, target, true, "vault-sync: fast-forward")
            .during(GitOp::Checkout)?;
        self.repo.set_head(MAIN_REF).during(GitOp::Checkout)
    }

    /// Replay local commits on top of `upstream`. Returns the number of
    /// conflicting paths resolved in favour of the local side.
    fn rebase_onto(&self, upstream: Oid) -> GitResult<usize> {
        let sig = self.signature()?;
        let upstream_commit = self
            .repo
            .find_annotated_commit(upstream)
            .during(GitOp::Rebase)?;

        let mut rebase = self
            .repo
            .rebase(None, Some(&upstream_commit), None, None)
            .during(GitOp::Rebase)?;

        let mut resolved = 0;
        while let Some(op) = rebase.next() {
            let op = op.during(GitOp::Rebase)?;
            debug!("[git] Replaying {}", op.id());

            let mut index = self.repo.index().during(GitOp::Rebase)?;
            index.read(false).during(GitOp::Rebase)?;
            if index.has_conflicts() {
                info!("Merge conflict detected. Keeping local changes...");
                resolved += self.keep_local_side(&mut index)?;
            }

            match rebase.commit(None, &sig, None) {
                Ok(_) => {}
                // Nothing left to apply from this commit.
                Err(e) if e.code() == ErrorCode::Applied => {}
                Err(e) => return Err(GitError::new(GitOp::Rebase, e)),
            }
        }

        rebase.finish(Some(&sig)).during(GitOp::Rebase)?;
        Ok(resolved)
    }

    /// Resolve every conflict in `index` with the replayed (local) commit's
    /// version of the path, and mirror it into the working tree.
    fn keep_local_side(&self, index: &mut git2::Index) -> GitResult<usize> {
        let conflicts = index
            .conflicts()
            .during(GitOp::Rebase)?
            .collect::<Result<Vec<_>, _>>()
            .during(GitOp::Rebase)?;
        let workdir = self.workdir()?.to_path_buf();

        let mut checkout_paths = Vec::new();
        for conflict in &conflicts {
            let Some(path) = conflict_path(conflict) else {
                continue;
            };
            debug!("[git] Resolving {} with local content", path.display());

            index.remove_path(&path).during(GitOp::Rebase)?;
            match &conflict.their {
                Some(entry) => {
                    let mut entry = clone_entry(entry);
                    entry.flags &= !INDEX_STAGE_MASK;
                    index.add(&entry).during(GitOp::Rebase)?;
                    checkout_paths.push(path);
                }
                None => {
                    let file = workdir.join(&path);
                    if file.exists() {
                        std::fs::remove_file(&file).map_err(|e| {
                            GitError::with_kind(GitOp::Rebase, FailureKind::Other, &e.to_string())
                        })?;
                    }
                }
            }
        }
        index.write().during(GitOp::Rebase)?;

        if !checkout_paths.is_empty() {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            for path in &checkout_paths {
                checkout.path(path.as_path());
            }
            self.repo
                .checkout_index(Some(&mut *index), Some(&mut checkout))
                .during(GitOp::Rebase)?;
        }

        Ok(conflicts.len())
    }

    /// Push local `main` to `origin`; a rejected update is an error.
    pub fn push_main(&self) -> GitResult<()> {
        let config = self.repo.config().during(GitOp::Push)?;
        let mut remote = self.repo.find_remote(ORIGIN).during(GitOp::Push)?;
        let rejection: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = remote_callbacks(&config);
            callbacks.push_update_reference(|refname, status| {
                if let Some(msg) = status {
                    *rejection.borrow_mut() = Some(format!("{}: {}", refname, msg));
                }
                Ok(())
            });

            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(callbacks);

            let refspec = format!("{}:{}", MAIN_REF, MAIN_REF);
            remote
                .push(&[refspec.as_str()], Some(&mut push_opts))
                .during(GitOp::Push)?;
        }

        match rejection.into_inner() {
            Some(msg) => Err(GitError::with_kind(GitOp::Push, FailureKind::Rejected, &msg)),
            None => Ok(()),
        }
    }

    /// Record `origin/main` as the upstream of local `main`
    pub fn set_upstream(&self) -> GitResult<()> {
        let mut config = self.repo.config().during(GitOp::Push)?;
        config
            .set_str(&format!("branch.{}.remote", MAIN_BRANCH), ORIGIN)
            .during(GitOp::Push)?;
        config
            .set_str(&format!("branch.{}.merge", MAIN_BRANCH), MAIN_REF)
            .during(GitOp::Push)
    }

    /// Signature from config, or the fallback identity
    fn signature(&self) -> GitResult<Signature<'static>> {
        self.repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
            .during(GitOp::Commit)
    }

    /// HEAD commit (if any)
    pub fn head_commit(&self) -> Option<Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Symbolic target of HEAD, also for an unborn branch
    fn head_target(&self) -> Option<String> {
        self.repo
            .find_reference("HEAD")
            .ok()
            .and_then(|head| head.symbolic_target().map(str::to_string))
    }
}

fn conflict_path(conflict: &git2::IndexConflict) -> Option<PathBuf> {
    let entry = conflict
        .their
        .as_ref()
        .or(conflict.our.as_ref())
        .or(conflict.ancestor.as_ref())?;
    Some(PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
}

fn clone_entry(entry: &IndexEntry) -> IndexEntry {
    IndexEntry {
        ctime: entry.ctime,
        mtime: entry.mtime,
        dev: entry.dev,
        ino: entry.ino,
        mode: entry.mode,
        uid: entry.uid,
        gid: entry.gid,
        file_size: entry.file_size,
        id: entry.id,
        flags: entry.flags,
        flags_extended: entry.flags_extended,
        path: entry.path.clone(),
    }
}

/// Callbacks for network operations: SSH agent, then git credential
/// helpers, then default credentials.
fn remote_callbacks(config: &git2::Config) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.credentials(move |url, username_from_url, allowed_types| {
        attempts += 1;
        if attempts > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                git2::ErrorClass::Net,
                format!("authentication failed for {}", url),
            ));
        }

        if allowed_types.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::credential_helper(config, url, username_from_url);
        }
        if allowed_types.contains(CredentialType::USERNAME) {
            return Cred::username(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });

    callbacks
}
