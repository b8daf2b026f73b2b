/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/context.rs
 *
 * `GitContext` plays the role of a builder on the caller side (the
 * closure passed to the serializer sets fields on it as it works) and a
 * decision record on the serializer side (the protocol reads those
 * fields back once the closure returns). Kept as an explicit parameter
 * rather than thread-local state, per the design notes.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

/// Per-operation scratchpad threaded through a single serializer pass.
#[derive(Debug, Default)]
pub struct GitContext {
    pub require_commit: bool,
    pub require_push: bool,
    pub commit_message: String,
    pub push_branch: Option<String>,
}

impl GitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks this operation as needing a commit, appending `message` to
    /// the accumulating commit message.
    pub fn commit(&mut self, message: impl Into<String>) -> &mut Self {
        self.require_commit = true;
        let message = message.into();
        if self.commit_message.is_empty() {
            self.commit_message = message;
        } else {
            self.commit_message.push('\n');
            self.commit_message.push_str(&message);
        }
        self
    }

    /// Forces a push even if HEAD did not move (rarely needed; commit
    /// detection already covers the common case).
    pub fn push(&mut self) -> &mut Self {
        self.require_push = true;
        self
    }

    /// Overrides the branch pushed at epilogue time. Defaults to
    /// whichever branch was checked out when the commit happened.
    pub fn push_branch(&mut self, branch: impl Into<String>) -> &mut Self {
        self.push_branch = Some(branch.into());
        self
    }
}

/// A persistent git author/committer identity, supplied explicitly to
/// [`crate::serializer::OperationSerializer::write_op_with_identity`]
/// rather than synthesized from repository config. Lets a caller with
/// its own notion of "who is committing" (a bot account, a named
/// coordination-service principal) author a commit under that name
/// without mutating `user.name`/`user.email` in the shared repository
/// config.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into() }
    }
}
