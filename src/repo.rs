/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/repo.rs
 *
 * Thin synchronous wrapper around `git2::Repository`. Every method
 * here blocks; callers on the async side always reach it through
 * `tokio::task::spawn_blocking` (libgit2 offers no async API, the same
 * constraint noted for `git_ops::push_changes`).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Cred, FetchOptions, FileFavor, MergeOptions, ObjectType, PushOptions, RemoteCallbacks,
    Repository, ResetType, Signature, StatusOptions,
};
use tracing::{debug, warn};

use crate::context::CommitIdentity;
use crate::credentials::Credentials;
use crate::error::{Error, Result};

pub const ORIGIN: &str = "origin";
pub const MASTER: &str = "master";

/// Outcome of attempting to merge the fetched remote branch into the
/// local one. `merge_theirs` never leaves a conflict behind: any
/// textual conflict is auto-resolved in favor of the remote, matching
/// the "remote is authoritative" policy. The variant still tells the
/// caller whether anything changed, so the protocol can skip an empty
/// commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    FastForwarded,
    Merged,
}

pub struct RepoHandle {
    repo: Repository,
}

impl RepoHandle {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self { repo: Repository::open(path)? })
    }

    /// Initializes a brand-new repository at `path` with a single empty
    /// root commit on `master`, so that later branch/merge operations
    /// never have to special-case an unborn HEAD.
    pub fn init(path: &Path) -> Result<Self> {
        let repo = Repository::init(path)?;
        {
            let tree_id = {
                let mut builder = repo.treebuilder(None)?;
                builder.write()?
            };
            let tree = repo.find_tree(tree_id)?;
            let signature = Signature::now("fabric-git-store", "fabric-git-store@local")?;
            repo.commit(Some("HEAD"), &signature, &signature, "bootstrap", &tree, &[])?;
        }
        let head = repo.head()?;
        if head.shorthand() != Some(MASTER) {
            let oid = head.target().ok_or_else(|| Error::Precondition("unborn HEAD after bootstrap".into()))?;
            repo.branch(MASTER, &repo.find_commit(oid)?, false)?;
            repo.set_head(&format!("refs/heads/{}", MASTER))?;
        }
        Ok(Self { repo })
    }

    pub fn path(&self) -> &Path {
        self.repo.path().parent().unwrap_or_else(|| self.repo.path())
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(self.repo.signature().or_else(|_| Signature::now("fabric-git-store", "fabric-git-store@local"))?)
    }

    /// Resolves the signature to author a commit with: `identity` when
    /// supplied (an authored commit), otherwise the repository's
    /// configured `user.name`/`user.email`, falling back to a generic
    /// identity when neither is set.
    fn signature_for(&self, identity: Option<&CommitIdentity>) -> Result<Signature<'static>> {
        match identity {
            Some(identity) => Ok(Signature::now(&identity.name, &identity.email)?),
            None => self.signature(),
        }
    }

    fn credential_callback<'a>(credentials: Option<&'a Credentials>) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            if let Some(creds) = credentials {
                return Cred::userpass_plaintext(&creds.username, &creds.password);
            }
            if allowed_types.is_ssh_key() {
                if let Some(username) = username_from_url {
                    return Cred::ssh_key_from_agent(username);
                }
            }
            Cred::default()
        });
        callbacks
    }

    // -- branches ---------------------------------------------------

    pub fn list_local_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.find_branch(name, git2::BranchType::Local).is_ok())
    }

    pub fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        let source = self.repo.find_branch(from, git2::BranchType::Local)?;
        let commit = source.get().peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self.repo.find_branch(name, git2::BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = self.repo.head();
        let head = match head {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(head.shorthand().map(|s| s.to_string()))
    }

    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let reference = format!("refs/heads/{}", name);
        let object = self.repo.revparse_single(&reference)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_tree(&object, Some(&mut checkout))?;
        self.repo.set_head(&reference)?;
        Ok(())
    }

    // -- working tree -------------------------------------------------

    pub fn status_is_clean(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(true);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses.is_empty())
    }

    pub fn add_all(&self) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].into_iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    pub fn remove_path(&self, relative: &Path) -> Result<()> {
        let absolute = self.path().join(relative);
        if absolute.is_dir() {
            std::fs::remove_dir_all(&absolute)?;
        } else if absolute.exists() {
            std::fs::remove_file(&absolute)?;
        }
        let mut index = self.repo.index()?;
        let _ = index.remove_all(std::iter::once(relative), None);
        index.write()?;
        Ok(())
    }

    /// Commits the current index if (and only if) it differs from HEAD's
    /// tree, authored under `identity` when supplied (otherwise the
    /// repository's own configured identity). Returns `true` when a
    /// commit was created.
    pub fn commit_if_changed(&self, message: &str, identity: Option<&CommitIdentity>) -> Result<bool> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let head_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(ref parent) = head_commit {
            if parent.tree_id() == tree_id {
                return Ok(false);
            }
        }

        let signature = self.signature_for(identity)?;
        let parents: Vec<&git2::Commit> = head_commit.iter().collect();
        self.repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(true)
    }

    /// Removes untracked files and directories from the working tree,
    /// mirroring `git clean -fd`. Run before a reconciliation merge so
    /// leftovers from an earlier failed operation can't interfere with
    /// the checkout/merge sequence.
    pub fn clean(&self) -> Result<()> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        for entry in statuses.iter() {
            if !entry.status().contains(git2::Status::WT_NEW) {
                continue;
            }
            let Some(relative) = entry.path() else { continue };
            let absolute = self.path().join(relative);
            if absolute.is_dir() {
                let _ = std::fs::remove_dir_all(&absolute);
            } else {
                let _ = std::fs::remove_file(&absolute);
            }
        }
        Ok(())
    }

    // -- stash ----------------------------------------------------------

    /// Stashes local modifications, returning `true` if there was
    /// anything to stash. A clean tree leaves nothing behind (stashing
    /// with no changes is a libgit2 error).
    pub fn stash_if_dirty(&mut self) -> Result<bool> {
        if self.status_is_clean()? {
            return Ok(false);
        }
        let signature = self.signature()?;
        self.repo.stash_save(&signature, "fabric-git-store autosave", None)?;
        Ok(true)
    }

    pub fn stash_pop(&mut self) -> Result<()> {
        self.repo.stash_pop(0, None)?;
        Ok(())
    }

    // -- remotes ----------------------------------------------------------

    /// Points `origin` at `url`, creating it if absent, and ensures it
    /// carries the `+refs/heads/*:refs/remotes/origin/*` fetch refspec
    /// so that a full branch mirror is always visible locally.
    pub fn set_remote_url(&self, url: &str) -> Result<()> {
        if self.repo.find_remote(ORIGIN).is_ok() {
            self.repo.remote_delete(ORIGIN)?;
        }
        self.repo
            .remote_with_fetch(ORIGIN, url, "+refs/heads/*:refs/remotes/origin/*")?;
        Ok(())
    }

    pub fn remote_url(&self) -> Result<Option<String>> {
        match self.repo.find_remote(ORIGIN) {
            Ok(remote) => Ok(remote.url().map(|s| s.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_remote(&self) -> bool {
        self.repo.find_remote(ORIGIN).is_ok()
    }

    /// Branch names visible under `refs/remotes/origin/*`.
    pub fn list_remote_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(git2::BranchType::Remote))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                if let Some(stripped) = name.strip_prefix("origin/") {
                    if stripped != "HEAD" {
                        names.push(stripped.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Creates a local branch tracking `refs/remotes/origin/<name>` and
    /// pointing at the same commit.
    pub fn create_tracking_branch(&self, name: &str) -> Result<()> {
        let remote_ref = format!("refs/remotes/origin/{}", name);
        let commit = self.repo.find_reference(&remote_ref)?.peel_to_commit()?;
        let mut branch = self.repo.branch(name, &commit, false)?;
        branch.set_upstream(Some(&format!("origin/{}", name)))?;
        Ok(())
    }

    pub fn has_remote_branch(&self, name: &str) -> Result<bool> {
        let reference = format!("refs/remotes/origin/{}", name);
        match self.repo.find_reference(&reference) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn branch_commit_id(&self, name: &str) -> Result<git2::Oid> {
        let reference = format!("refs/heads/{}", name);
        Ok(self.repo.find_reference(&reference)?.peel_to_commit()?.id())
    }

    pub fn remote_branch_commit_id(&self, name: &str) -> Result<Option<git2::Oid>> {
        let reference = format!("refs/remotes/origin/{}", name);
        match self.repo.find_reference(&reference) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches all remote branches. Network failures are logged and
    /// swallowed: the caller proceeds against whatever was last fetched,
    /// per the "local commit is the authoritative outcome" policy.
    pub fn fetch(&self, credentials: Option<&Credentials>) {
        let mut remote = match self.repo.find_remote(ORIGIN) {
            Ok(remote) => remote,
            Err(_) => return,
        };
        let callbacks = Self::credential_callback(credentials);
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        if let Err(e) = remote.fetch(&["+refs/heads/*:refs/remotes/origin/*"], Some(&mut options), None) {
            warn!(error = %e, "fetch from origin failed, continuing with local state");
        }
    }

    pub fn push(&self, branch: &str, credentials: Option<&Credentials>) {
        let mut remote = match self.repo.find_remote(ORIGIN) {
            Ok(remote) => remote,
            Err(_) => return,
        };
        let callbacks = Self::credential_callback(credentials);
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        if let Err(e) = remote.push(&[&refspec], Some(&mut options)) {
            warn!(error = %e, branch, "push to origin failed, local commit retained");
        }
    }

    // -- merge ------------------------------------------------------------

    /// Merges `refs/remotes/origin/<branch>` into the local `branch`,
    /// resolving any conflict in the remote's favor. This is the sole
    /// conflict-resolution policy; it is not configurable.
    pub fn merge_theirs(&self, branch: &str) -> Result<MergeOutcome> {
        let remote_ref = format!("refs/remotes/origin/{}", branch);
        let remote_commit = match self.repo.find_reference(&remote_ref) {
            Ok(reference) => reference.peel_to_commit()?,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(MergeOutcome::AlreadyUpToDate),
            Err(e) => return Err(e.into()),
        };

        let local_ref = format!("refs/heads/{}", branch);
        let local_commit = self.repo.find_reference(&local_ref)?.peel_to_commit()?;

        if local_commit.id() == remote_commit.id() {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let base_id = self.repo.merge_base(local_commit.id(), remote_commit.id())?;
        if base_id == local_commit.id() {
            self.repo.reference(&local_ref, remote_commit.id(), true, "fast-forward")?;
            if self.current_branch()?.as_deref() == Some(branch) {
                self.checkout_branch(branch)?;
            }
            return Ok(MergeOutcome::FastForwarded);
        }
        if base_id == remote_commit.id() {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let mut merge_opts = MergeOptions::new();
        merge_opts.file_favor(FileFavor::Theirs);

        let local_tree = local_commit.tree()?;
        let remote_tree = remote_commit.tree()?;
        let base_commit = self.repo.find_commit(base_id)?;
        let base_tree = base_commit.tree()?;

        let mut index = self
            .repo
            .merge_trees(&base_tree, &local_tree, &remote_tree, Some(&merge_opts))?;

        if index.has_conflicts() {
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(theirs) = conflict.their {
                    index.remove_path(Path::new(std::str::from_utf8(&theirs.path).unwrap_or_default()))?;
                    index.add(&theirs)?;
                } else if let Some(ancestor) = conflict.ancestor {
                    // remote deleted the file: keep that deletion.
                    index.remove_path(Path::new(std::str::from_utf8(&ancestor.path).unwrap_or_default()))?;
                }
            }
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let message = format!("merge origin/{} into {}", branch, branch);
        let merge_commit = self.repo.commit(
            None,
            &signature,
            &signature,
            &message,
            &tree,
            &[&local_commit, &remote_commit],
        )?;
        self.repo.reference(&local_ref, merge_commit, true, "merge theirs")?;

        if self.current_branch()?.as_deref() == Some(branch) {
            self.checkout_branch(branch)?;
        }
        debug!(branch, "merged remote branch with theirs policy");
        Ok(MergeOutcome::Merged)
    }

    // -- content read/write ------------------------------------------------

    pub fn read_file(&self, relative: &Path) -> Result<Option<Vec<u8>>> {
        let absolute = self.path().join(relative);
        match std::fs::read(&absolute) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`Self::read_file`], but when `relative` names a directory
    /// instead of a file, concatenates `"<child_name> = <child_contents>\n"`
    /// for every direct child, rather than erroring. Supports PID lookups
    /// that resolve to a directory of per-container overrides.
    pub fn read_file_or_directory(&self, relative: &Path) -> Result<Option<Vec<u8>>> {
        let absolute = self.path().join(relative);
        if absolute.is_dir() {
            let mut out = Vec::new();
            let mut entries: Vec<_> = std::fs::read_dir(&absolute)?.collect::<std::result::Result<_, _>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let contents = std::fs::read(&path)?;
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b" = ");
                out.extend_from_slice(&contents);
                out.push(b'\n');
            }
            return Ok(Some(out));
        }
        self.read_file(relative)
    }

    pub fn write_file(&self, relative: &Path, contents: &[u8]) -> Result<()> {
        let absolute = self.path().join(relative);
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(absolute, contents)?;
        Ok(())
    }

    pub fn read_file_at(&self, branch: &str, relative: &Path) -> Result<Option<Vec<u8>>> {
        let reference = format!("refs/heads/{}", branch);
        let commit = match self.repo.find_reference(&reference) {
            Ok(reference) => reference.peel_to_commit()?,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.read_file_at_commit(commit.id(), relative)
    }

    fn read_file_at_commit(&self, commit_id: git2::Oid, relative: &Path) -> Result<Option<Vec<u8>>> {
        let commit = self.repo.find_commit(commit_id)?;
        let tree = commit.tree()?;
        match tree.get_path(relative) {
            Ok(entry) => {
                let object = entry.to_object(&self.repo)?;
                match object.kind() {
                    Some(ObjectType::Blob) => {
                        let blob = object.peel_to_blob()?;
                        Ok(Some(blob.content().to_vec()))
                    }
                    _ => Ok(None),
                }
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Commit ids touching `relative` on `branch`, newest first.
    pub fn file_history(&self, branch: &str, relative: &Path, limit: usize) -> Result<Vec<git2::Oid>> {
        let reference = format!("refs/heads/{}", branch);
        let start = self.repo.find_reference(&reference)?.peel_to_commit()?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(start.id())?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let mut history = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let tree = commit.tree()?;
            let touched = if commit.parent_count() == 0 {
                tree.get_path(relative).is_ok()
            } else {
                let parent_tree = commit.parent(0)?.tree()?;
                let diff = self.repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
                diff.deltas().any(|delta| {
                    delta.old_file().path() == Some(relative) || delta.new_file().path() == Some(relative)
                })
            };
            if touched {
                history.push(oid);
                if history.len() >= limit {
                    break;
                }
            }
        }
        Ok(history)
    }

    /// Unified diff of `relative` between two commits.
    pub fn file_diff(&self, from: git2::Oid, to: git2::Oid, relative: &Path) -> Result<String> {
        let from_tree = self.repo.find_commit(from)?.tree()?;
        let to_tree = self.repo.find_commit(to)?.tree()?;
        let mut options = git2::DiffOptions::new();
        options.pathspec(relative.to_string_lossy().into_owned());
        let diff = self.repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut options))?;

        let mut rendered = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            if let Ok(content) = std::str::from_utf8(line.content()) {
                match line.origin() {
                    '+' | '-' | ' ' => rendered.push(line.origin()),
                    _ => {}
                }
                rendered.push_str(content);
            }
            true
        })?;
        Ok(rendered)
    }

    /// Restores `relative` to its content at `commit_id` and stages it
    /// for the next commit, without touching the rest of the tree.
    pub fn revert_file(&self, branch: &str, relative: &Path, commit_id: git2::Oid) -> Result<()> {
        match self.read_file_at_commit(commit_id, relative)? {
            Some(content) => self.write_file(relative, &content)?,
            None => self.remove_path(relative)?,
        }
        let mut index = self.repo.index()?;
        index.add_path(relative)?;
        index.write()?;
        let _ = branch;
        Ok(())
    }

    pub fn hard_reset_to_head(&self) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.reset(head.as_object(), ResetType::Hard, None)?;
        Ok(())
    }

    pub fn commit_message(&self, commit_id: git2::Oid) -> Result<String> {
        let commit = self.repo.find_commit(commit_id)?;
        Ok(commit.message().unwrap_or_default().to_string())
    }

    pub fn profiles_root(&self) -> PathBuf {
        self.path().join(crate::mapper::PROFILES_DIR)
    }
}
