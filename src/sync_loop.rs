/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/sync_loop.rs
 *
 * Background task that periodically pulls the remote even absent any
 * caller-driven operation, so a quiet fleet still converges. Shutdown
 * is cooperative: `stop` signals the loop and waits up to five seconds
 * for it to notice, rather than aborting the task outright.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::serializer::OperationSerializer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct SyncLoop {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SyncLoop {
    /// Spawns the loop; `period` is the interval between pulls.
    pub fn start(serializer: Arc<OperationSerializer>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = serializer
                            .write_op(|_repo, _ctx| Ok(()))
                            .await;
                        if let Err(e) = result {
                            warn!(error = %e, "background pull failed");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("sync loop received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self { handle: Some(handle), shutdown: Some(shutdown_tx) }
    }

    /// Signals the loop to stop and waits up to [`SHUTDOWN_GRACE`] for
    /// it to exit. Does not abort the task if it misses the deadline;
    /// it will simply be detached and finish on its own.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("sync loop did not stop within the grace period");
            }
        }
    }
}
