/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/serializer.rs
 *
 * Serializes every git-touching operation behind one exclusive lock.
 * Write passes run the order: stash -> fetch -> reconcile -> operation
 * -> commit -> restore checkout -> unstash -> push -> notify. Read
 * passes skip the stash/fetch/reconcile/commit/push steps entirely —
 * they still acquire the same mutex (a checkout is still a write to
 * the shared working directory) but never touch the network or HEAD.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::{Arc, Mutex};

use tracing::{instrument, warn};

use crate::context::{CommitIdentity, GitContext};
use crate::credentials::CredentialSource;
use crate::error::Result;
use crate::publisher::ChangePublisher;
use crate::reconciliation::reconcile;
use crate::repo::RepoHandle;

pub struct OperationSerializer {
    repo: Mutex<RepoHandle>,
    credentials: Arc<dyn CredentialSource>,
    publisher: Arc<ChangePublisher>,
}

impl OperationSerializer {
    pub fn new(repo: RepoHandle, credentials: Arc<dyn CredentialSource>, publisher: Arc<ChangePublisher>) -> Self {
        Self { repo: Mutex::new(repo), credentials, publisher }
    }

    /// Read-only pass: SKIPS the pull prelude entirely, per spec — a
    /// read never fetches, reconciles, stashes, commits, or pushes. It
    /// still serializes behind the same mutex as writes, because even a
    /// read can `checkout` the shared working tree.
    #[instrument(skip_all)]
    pub async fn read_op<T, F>(self: &Arc<Self>, op: F) -> Result<T>
    where
        F: FnOnce(&RepoHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let repo = this.repo.lock().expect("repository lock poisoned");
            op(&repo)
        })
        .await
        .map_err(|e| crate::error::Error::Coordination(anyhow::anyhow!(e)))?
    }

    /// Full read-write pass. `op` receives the repository and a
    /// [`GitContext`] it mutates to request a commit and/or push.
    #[instrument(skip_all)]
    pub async fn write_op<T, F>(self: &Arc<Self>, op: F) -> Result<T>
    where
        F: FnOnce(&RepoHandle, &mut GitContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_write_op(None, true, GitContext::new(), op).await
    }

    /// Parameterized write pass used for authored commits: `identity`
    /// overrides the commit's author/committer instead of the
    /// repository's configured identity, and `pull_first` lets a caller
    /// that has already reconciled (or deliberately wants to skip it)
    /// opt out of the pull prelude. `ctx` is supplied by the caller
    /// rather than constructed internally, so flags can be pre-seeded
    /// before `op` runs.
    #[instrument(skip(self, ctx, op))]
    pub async fn write_op_with_identity<T, F>(
        self: &Arc<Self>,
        identity: CommitIdentity,
        pull_first: bool,
        ctx: GitContext,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&RepoHandle, &mut GitContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_write_op(Some(identity), pull_first, ctx, op).await
    }

    async fn run_write_op<T, F>(self: &Arc<Self>, identity: Option<CommitIdentity>, pull_first: bool, mut ctx: GitContext, op: F) -> Result<T>
    where
        F: FnOnce(&RepoHandle, &mut GitContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = Arc::clone(self);
        let publisher = Arc::clone(&self.publisher);
        let result = tokio::task::spawn_blocking(move || -> Result<T> {
            let mut repo = this.repo.lock().expect("repository lock poisoned");
            let credentials = this.credentials.credentials()?;

            let original_branch = repo.current_branch()?;
            let stashed = repo.stash_if_dirty()?;

            let mut reconciled = false;
            if pull_first {
                repo.fetch(Some(&credentials));
                reconciled = match reconcile(&repo) {
                    Ok(outcome) => outcome.has_changed,
                    Err(e) => {
                        warn!(error = %e, "reconciliation failed before write, continuing against local state");
                        false
                    }
                };
            }

            let value = op(&repo, &mut ctx);

            let value = match value {
                Ok(value) => value,
                Err(e) => {
                    repo.hard_reset_to_head().ok();
                    if stashed {
                        repo.stash_pop().ok();
                    }
                    return Err(e);
                }
            };

            let mut committed = false;
            let committed_branch = repo.current_branch()?;
            if ctx.require_commit {
                repo.add_all()?;
                let message = if ctx.commit_message.is_empty() {
                    "fabric-git-store update".to_string()
                } else {
                    ctx.commit_message.clone()
                };
                committed = repo.commit_if_changed(&message, identity.as_ref())?;
            }

            if let Some(ref original) = original_branch {
                if repo.current_branch()?.as_deref() != Some(original.as_str()) {
                    repo.checkout_branch(original)?;
                }
            }

            if stashed {
                repo.stash_pop()?;
            }

            if committed || ctx.require_push {
                let push_branch = ctx
                    .push_branch
                    .clone()
                    .or(committed_branch)
                    .or(original_branch)
                    .unwrap_or_else(|| crate::repo::MASTER.to_string());
                repo.push(&push_branch, Some(&credentials));
            }

            if committed || reconciled {
                publisher.fire_change_notifications();
            }

            Ok(value)
        })
        .await
        .map_err(|e| crate::error::Error::Coordination(anyhow::anyhow!(e)))?;

        result
    }

    /// Read-only pass scoped to a specific version's branch: checks out
    /// `branch`, runs `op` against the working tree, then restores
    /// whatever branch was checked out before. SKIPS the pull prelude,
    /// same as [`Self::read_op`].
    #[instrument(skip(self, op), fields(branch))]
    pub async fn read_op_on_branch<T, F>(self: &Arc<Self>, branch: String, op: F) -> Result<T>
    where
        F: FnOnce(&RepoHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let repo = this.repo.lock().expect("repository lock poisoned");

            if !repo.branch_exists(&branch)? {
                return op(&repo);
            }

            let original = repo.current_branch()?;
            repo.checkout_branch(&branch)?;
            let result = op(&repo);
            if let Some(original) = original {
                if original != branch {
                    repo.checkout_branch(&original)?;
                }
            }
            result
        })
        .await
        .map_err(|e| crate::error::Error::Coordination(anyhow::anyhow!(e)))?
    }

    /// Like [`Self::write_op`], requiring `branch` to already exist.
    /// Fails the whole pass with [`crate::error::Error::Precondition`]
    /// before any stash/fetch happens if it does not.
    pub async fn write_op_on_existing_branch<T, F>(self: &Arc<Self>, branch: String, op: F) -> Result<T>
    where
        F: FnOnce(&RepoHandle, &mut GitContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let target = branch.clone();
        self.write_op(move |repo, ctx| {
            if !repo.branch_exists(&target)? {
                return Err(crate::error::Error::Precondition(format!("version '{}' does not exist", target)));
            }
            repo.checkout_branch(&target)?;
            op(repo, ctx)
        })
        .await
    }

    pub fn repo_path(&self) -> std::path::PathBuf {
        let repo = self.repo.lock().expect("repository lock poisoned");
        repo.path().to_path_buf()
    }

    pub fn profiles_root(&self) -> std::path::PathBuf {
        let repo = self.repo.lock().expect("repository lock poisoned");
        repo.profiles_root()
    }

    pub fn set_remote_url(&self, url: &str) -> Result<()> {
        let repo = self.repo.lock().expect("repository lock poisoned");
        repo.set_remote_url(url)
    }

    pub fn remote_url(&self) -> Result<Option<String>> {
        let repo = self.repo.lock().expect("repository lock poisoned");
        repo.remote_url()
    }

    /// Invalidates caches without fetching or pushing; used by the
    /// receive-pack hook, where the remote has already done the writing
    /// and this process only needs to know not to trust its caches.
    pub fn invalidate_caches_only(&self) {
        self.publisher.invalidate_caches();
    }
}
