/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/reconciliation.rs
 *
 * Brings local branches up to date with their fetched remote
 * counterparts. Runs at the top of every serializer pass, after fetch
 * and before the caller's operation, so every operation observes a
 * repository that is at least as current as the last successful
 * fetch.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::Result;
use crate::repo::{MergeOutcome, RepoHandle, MASTER};

const TMP_SUFFIX: &str = "-tmp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub has_changed: bool,
}

/// Reconciles the local branch set against the fetched remote state:
/// branches the remote dropped are deleted (except `master`), branches
/// only the remote has are checked out locally, and branches present
/// on both sides are merged with the "theirs" policy. Branch names
/// ending in `-tmp` are ignored entirely.
pub fn reconcile(repo: &RepoHandle) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();

    if !repo.has_remote() {
        return Ok(outcome);
    }

    let local: BTreeSet<String> = repo
        .list_local_branches()?
        .into_iter()
        .filter(|b| !b.ends_with(TMP_SUFFIX))
        .collect();
    let remote: BTreeSet<String> = repo
        .list_remote_branches()?
        .into_iter()
        .filter(|b| !b.ends_with(TMP_SUFFIX))
        .collect();
    let remote_is_empty = remote.is_empty();

    let git_versions: BTreeSet<String> = local.union(&remote).cloned().collect();
    let current = repo.current_branch()?;

    for version in &git_versions {
        let on_remote = remote.contains(version);
        let on_local = local.contains(version);

        if on_local && !on_remote {
            if remote_is_empty || version == MASTER {
                continue;
            }
            if current.as_deref() == Some(version.as_str()) {
                repo.checkout_branch(MASTER)?;
            }
            repo.delete_branch(version)?;
            outcome.has_changed = true;
            debug!(branch = version.as_str(), "deleted branch whose remote counterpart disappeared");
            continue;
        }

        if !on_local && on_remote {
            repo.create_tracking_branch(version)?;
            outcome.has_changed = true;
            debug!(branch = version.as_str(), "created local branch tracking remote");
            continue;
        }

        // Divergent: clean untracked leftovers, force back onto HEAD, then
        // force onto the branch under reconciliation before merging, so
        // nothing from a prior failed operation interferes with either
        // checkout.
        let diverges = match repo.remote_branch_commit_id(version)? {
            Some(remote_id) => remote_id != repo.branch_commit_id(version)?,
            None => false,
        };
        if diverges {
            repo.clean()?;
            repo.hard_reset_to_head()?;
            repo.checkout_branch(version)?;
        }

        match repo.merge_theirs(version)? {
            MergeOutcome::AlreadyUpToDate => {}
            MergeOutcome::FastForwarded | MergeOutcome::Merged => {
                outcome.has_changed = true;
                debug!(branch = version.as_str(), "reconciled local branch with remote");
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reconcile_without_remote_is_a_no_op() {
        let dir = tempdir().unwrap();
        let repo = RepoHandle::init(dir.path()).unwrap();
        let outcome = reconcile(&repo).unwrap();
        assert!(!outcome.has_changed);
        assert!(repo.branch_exists(MASTER).unwrap());
    }

    #[test]
    fn reconcile_never_deletes_master_on_empty_remote() {
        let remote_dir = tempdir().unwrap();
        git2::Repository::init_bare(remote_dir.path()).unwrap();

        let dir = tempdir().unwrap();
        let repo = RepoHandle::init(dir.path()).unwrap();
        repo.set_remote_url(remote_dir.path().to_str().unwrap()).unwrap();
        repo.fetch(None);

        let outcome = reconcile(&repo).unwrap();
        assert!(!outcome.has_changed);
        assert!(repo.branch_exists(MASTER).unwrap());
    }
}
