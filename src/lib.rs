/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/lib.rs
 *
 * A versioned fleet configuration store backed by a git commit graph.
 * Profiles and their files live as directories and blobs on per-version
 * branches; every mutation is serialized behind one exclusive lock that
 * stashes, pulls, commits, and pushes in a fixed order so the local
 * working tree and the remote never observe a half-finished operation.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod attribute_store;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod mapper;
pub mod properties;
pub mod publisher;
pub mod reconciliation;
pub mod remote_listener;
pub mod repo;
pub mod serializer;
pub mod sync_loop;

pub use attribute_store::{AttributeStore, FabricRequirements, InMemoryAttributeStore, VersionAttributes};
pub use config::DataStoreConfig;
pub use credentials::{Credentials, CredentialSource, NoCredentials, StaticCredentialSource};
pub use error::{Error, Result};
pub use facade::{FileRevision, GitDataStore};
pub use publisher::{ChangeListener, ChangePublisher};
pub use remote_listener::RemoteUrlListener;

/// Installs a `tracing-subscriber` formatter honoring `RUST_LOG`,
/// falling back to `info` when unset. Mirrors the setup in
/// `core::tracing_layer`; callers embedding this crate in a larger
/// process are free to install their own subscriber instead and skip
/// this entirely.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
