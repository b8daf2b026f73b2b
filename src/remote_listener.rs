/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/remote_listener.rs
 *
 * Hooks into two events that originate outside the serializer: an
 * operator changing the configured remote URL at runtime, and the
 * bare remote notifying this process that it accepted a push from
 * somewhere else (a `post-receive` hook, typically).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::publisher::ChangePublisher;
use crate::serializer::OperationSerializer;

pub struct RemoteUrlListener {
    serializer: Arc<OperationSerializer>,
    publisher: Arc<ChangePublisher>,
}

impl RemoteUrlListener {
    pub fn new(serializer: Arc<OperationSerializer>, publisher: Arc<ChangePublisher>) -> Self {
        Self { serializer, publisher }
    }

    /// Repoints `origin` at the new URL, if it actually changed, and
    /// immediately pulls against it so the working copy does not sit
    /// behind until the next scheduled tick.
    pub async fn on_remote_url_changed(&self, url: &str) -> Result<()> {
        if self.serializer.remote_url()?.as_deref() == Some(url) {
            return Ok(());
        }
        info!(url, "remote url changed");
        self.serializer.set_remote_url(url)?;
        self.serializer.write_op(|_repo, _ctx| Ok(())).await
    }

    /// Called when the bare remote reports a push landed out-of-band.
    /// The local clone is now known to be behind; the next serializer
    /// pass will fetch and reconcile, so all this needs to do is make
    /// sure no stale read slips through in the meantime.
    pub fn on_receive_pack(&self) {
        self.publisher.invalidate_caches();
    }
}
