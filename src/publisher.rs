/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/publisher.rs
 *
 * Fan-out notification point for listeners interested in "something
 * under this store changed". `generation` stands in for the cache
 * generation a real deployment would key reads against: bumping it is
 * cheaper than actually clearing anything, and gives callers a value
 * to compare instead of a boolean they might miss.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

/// Registered against a [`ChangePublisher`] to learn about committed
/// mutations and successful pulls.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self);
}

#[derive(Default)]
pub struct ChangePublisher {
    listeners: RwLock<Vec<std::sync::Arc<dyn ChangeListener>>>,
    generation: AtomicU64,
}

impl ChangePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, listener: std::sync::Arc<dyn ChangeListener>) {
        self.listeners.write().expect("publisher lock poisoned").push(listener);
    }

    pub fn unbind(&self, listener: &std::sync::Arc<dyn ChangeListener>) {
        let mut listeners = self.listeners.write().expect("publisher lock poisoned");
        listeners.retain(|existing| !std::sync::Arc::ptr_eq(existing, listener));
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Bumps the generation without notifying listeners. Used when the
    /// local repository is known to be stale (e.g. the receive-pack
    /// hook fired) but no listener needs to re-derive anything yet.
    pub fn invalidate_caches(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Bumps the generation and notifies every bound listener. Used
    /// after a commit or a reconciliation that actually changed state.
    pub fn fire_change_notifications(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let listeners = self.listeners.read().expect("publisher lock poisoned");
        debug!(count = listeners.len(), "firing change notifications");
        for listener in listeners.iter() {
            listener.on_change();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingListener(AtomicUsize);

    impl ChangeListener for CountingListener {
        fn on_change(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn invalidate_caches_bumps_generation_without_notifying() {
        let publisher = ChangePublisher::new();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        publisher.bind(listener.clone());
        publisher.invalidate_caches();
        assert_eq!(publisher.generation(), 1);
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fire_change_notifications_notifies_bound_listeners() {
        let publisher = ChangePublisher::new();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        publisher.bind(listener.clone());
        publisher.fire_change_notifications();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unbind_stops_further_notifications() {
        let publisher = ChangePublisher::new();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        publisher.bind(listener.clone());
        publisher.unbind(&listener);
        publisher.fire_change_notifications();
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
    }
}
