/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: tests/store.rs
 *
 * Exercises the testable properties from the facade's spec: version
 * creation, profile creation, file/PID configuration round trips, and
 * disjoint concurrent writers. Runs against real on-disk git
 * repositories via `tempfile`, never a mock.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fabric_git_store::{ChangeListener, DataStoreConfig, GitDataStore};
use tempfile::tempdir;

fn open_store(path: &std::path::Path) -> GitDataStore {
    GitDataStore::open(path, &DataStoreConfig::default()).expect("open store")
}

fn open_store_with_config(path: &std::path::Path, config: &DataStoreConfig) -> GitDataStore {
    GitDataStore::open(path, config).expect("open store")
}

struct CountingListener(AtomicUsize);

impl ChangeListener for CountingListener {
    fn on_change(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn create_version_is_visible_and_has_one_commit() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.create_version("1.1").await.unwrap();

    assert!(store.has_version("1.1").await.unwrap());
    assert!(store.list_versions().await.unwrap().contains(&"1.1".to_string()));
}

#[tokio::test]
async fn create_version_twice_is_a_precondition_failure() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.create_version("1.0").await.unwrap();
    let err = store.create_version("1.0").await.unwrap_err();
    assert!(matches!(err, fabric_git_store::Error::Precondition(_)));
}

#[tokio::test]
async fn set_then_get_file_configuration_round_trips() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();
    store.create_profile("1.0", "default").await.unwrap();

    store
        .set_file_configuration("1.0", "default", "log4j.properties", Some(b"x=1".to_vec()))
        .await
        .unwrap();

    let content = store.get_file_configuration("1.0", "default", "log4j.properties").await.unwrap();
    assert_eq!(content, Some(b"x=1".to_vec()));

    let history = store.get_file_history("1.0", "default", "log4j.properties", 1).await.unwrap();
    assert_eq!(history[0].message, "Updated log4j.properties for profile default");
}

#[tokio::test]
async fn set_file_configurations_replaces_with_symmetric_difference() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();
    store.create_profile("1.0", "p").await.unwrap();

    let mut first = BTreeMap::new();
    first.insert("a.properties".to_string(), b"A".to_vec());
    first.insert("b.properties".to_string(), b"B".to_vec());
    store.set_file_configurations("1.0", "p", first).await.unwrap();

    let mut second = BTreeMap::new();
    second.insert("a.properties".to_string(), b"A2".to_vec());
    store.set_file_configurations("1.0", "p", second).await.unwrap();

    let files = store.get_file_configurations("1.0", "p").await.unwrap();
    assert_eq!(files.get("a.properties"), Some(&b"A2".to_vec()));
    assert_eq!(files.get("b.properties"), None);
    // the agent metadata marker file created by create_profile always survives.
    assert!(files.contains_key("org.fusesource.fabric.agent.properties"));
}

#[tokio::test]
async fn set_then_get_configuration_round_trips_by_pid() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();
    store.create_profile("1.0", "default").await.unwrap();

    let mut values = BTreeMap::new();
    values.insert("min".to_string(), "1".to_string());
    values.insert("max".to_string(), "10".to_string());
    store.set_configuration("1.0", "default", "org.example.mq", values.clone()).await.unwrap();

    let read_back = store.get_configuration("1.0", "default", "org.example.mq").await.unwrap();
    assert_eq!(read_back, values);
}

#[tokio::test]
async fn create_profile_creates_agent_metadata_marker() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();

    store.create_profile("1.0", "foo-bar").await.unwrap();

    let marker = store
        .get_file_configuration("1.0", "foo-bar", "org.fusesource.fabric.agent.properties")
        .await
        .unwrap()
        .expect("marker file present");
    assert!(String::from_utf8(marker).unwrap().starts_with("#Profile:foo-bar"));
    assert!(store.list_profiles("1.0").await.unwrap().contains(&"foo-bar".to_string()));
}

#[tokio::test]
async fn create_profile_is_a_no_op_when_marker_already_exists() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();

    store.create_profile("1.0", "default").await.unwrap();
    store.create_profile("1.0", "default").await.unwrap();

    assert_eq!(store.list_profiles("1.0").await.unwrap().iter().filter(|p| *p == "default").count(), 1);
}

#[tokio::test]
async fn concurrent_disjoint_writers_both_observe_their_values() {
    let dir = tempdir().unwrap();
    let store = std::sync::Arc::new(open_store(dir.path()));
    store.create_version("1.0").await.unwrap();
    store.create_profile("1.0", "p").await.unwrap();

    let a = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            store.set_file_configuration("1.0", "p", "a.properties", Some(b"A".to_vec())).await.unwrap();
        })
    };
    let b = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            store.set_file_configuration("1.0", "p", "b.properties", Some(b"B".to_vec())).await.unwrap();
        })
    };
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(
        store.get_file_configuration("1.0", "p", "a.properties").await.unwrap(),
        Some(b"A".to_vec())
    );
    assert_eq!(
        store.get_file_configuration("1.0", "p", "b.properties").await.unwrap(),
        Some(b"B".to_vec())
    );
}

#[tokio::test]
async fn remote_advance_is_reconciled_and_fires_notification_once() {
    let bare_dir = tempdir().unwrap();
    git2::Repository::init_bare(bare_dir.path()).unwrap();

    let local_dir = tempdir().unwrap();
    let config = DataStoreConfig {
        git_remote_url: Some(bare_dir.path().to_str().unwrap().to_string()),
        ..DataStoreConfig::default()
    };
    let store = open_store_with_config(local_dir.path(), &config);
    store.create_version("1.0").await.unwrap();

    let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
    store.bind_listener(listener.clone());

    // A second clone advances "1.0" on the shared remote while `store` is idle.
    let other_dir = tempdir().unwrap();
    let other_config = DataStoreConfig {
        git_remote_url: Some(bare_dir.path().to_str().unwrap().to_string()),
        ..DataStoreConfig::default()
    };
    let other = open_store_with_config(other_dir.path(), &other_config);
    other
        .set_file_configuration("1.0", "default", "remote.properties", Some(b"from=remote".to_vec()))
        .await
        .unwrap();

    // Next write on the original store runs the pull prelude and reconciles
    // with the "theirs" merge policy before committing its own change.
    store
        .set_file_configuration("1.0", "default", "local.properties", Some(b"from=local".to_vec()))
        .await
        .unwrap();

    let files = store.get_file_configurations("1.0", "default").await.unwrap();
    assert_eq!(files.get("remote.properties"), Some(&b"from=remote".to_vec()));
    assert_eq!(files.get("local.properties"), Some(&b"from=local".to_vec()));
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn list_versions_excludes_master() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store.create_version("1.0").await.unwrap();

    let versions = store.list_versions().await.unwrap();
    assert!(versions.contains(&"1.0".to_string()));
    assert!(!versions.contains(&"master".to_string()));
}
