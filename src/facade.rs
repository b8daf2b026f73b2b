/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/facade.rs
 *
 * Public entry point. Every method here is a thin translation from a
 * domain operation to one serializer pass; none of them touch
 * `git2` directly.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::attribute_store::{AttributeStore, FabricRequirements, InMemoryAttributeStore, VersionAttributes};
use crate::config::DataStoreConfig;
use crate::credentials::{Credentials, CredentialSource, NoCredentials, StaticCredentialSource};
use crate::error::{Error, Result};
use crate::mapper::{Mapper, AGENT_PROPERTIES_FILE};
use crate::publisher::{ChangeListener, ChangePublisher};
use crate::remote_listener::RemoteUrlListener;
use crate::repo::{RepoHandle, MASTER};
use crate::serializer::OperationSerializer;
use crate::sync_loop::SyncLoop;

/// One historical revision of a configuration file, as surfaced by
/// [`GitDataStore::get_file_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRevision {
    pub commit_id: String,
    pub message: String,
}

/// Versioned, git-backed store of fleet profiles and configuration.
pub struct GitDataStore {
    serializer: Arc<OperationSerializer>,
    publisher: Arc<ChangePublisher>,
    attributes: Arc<dyn AttributeStore>,
    mapper: Mapper,
    sync_loop: AsyncMutex<Option<SyncLoop>>,
    pull_period: Duration,
}

impl GitDataStore {
    /// Opens (initializing if necessary) the git repository at
    /// `local_path` and wires it to `config`. Does not start the
    /// background sync loop; call [`Self::activate`] for that.
    pub fn open(local_path: &Path, config: &DataStoreConfig) -> Result<Self> {
        let repo = if local_path.join(".git").exists() {
            RepoHandle::open(local_path)?
        } else {
            std::fs::create_dir_all(local_path)?;
            RepoHandle::init(local_path)?
        };

        if let Some(url) = &config.git_remote_url {
            repo.set_remote_url(url)?;
        }

        let credentials: Arc<dyn CredentialSource> = match config.static_credentials() {
            Some(Credentials { username, password }) => Arc::new(StaticCredentialSource::new(username, password)),
            None => Arc::new(NoCredentials),
        };

        let publisher = Arc::new(ChangePublisher::new());
        let serializer = Arc::new(OperationSerializer::new(repo, credentials, Arc::clone(&publisher)));

        Ok(Self {
            serializer,
            publisher,
            attributes: Arc::new(InMemoryAttributeStore::new()),
            mapper: Mapper::default(),
            sync_loop: AsyncMutex::new(None),
            pull_period: Duration::from_millis(config.git_pull_period.max(1)),
        })
    }

    /// Swaps in a different attribute store (e.g. a coordination
    /// service-backed one) before activation.
    pub fn with_attribute_store(mut self, attributes: Arc<dyn AttributeStore>) -> Self {
        self.attributes = attributes;
        self
    }

    // -- lifecycle ----------------------------------------------------

    pub async fn activate(&self) {
        self.start_sync_loop().await;
    }

    pub async fn start_sync_loop(&self) {
        let mut guard = self.sync_loop.lock().await;
        if guard.is_none() {
            *guard = Some(SyncLoop::start(Arc::clone(&self.serializer), self.pull_period));
        }
    }

    pub async fn deactivate(&self) {
        let mut guard = self.sync_loop.lock().await;
        if let Some(mut loop_handle) = guard.take() {
            loop_handle.stop().await;
        }
    }

    pub fn bind_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.publisher.bind(listener);
    }

    pub fn unbind_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.publisher.unbind(listener);
    }

    pub fn remote_url_listener(&self) -> RemoteUrlListener {
        RemoteUrlListener::new(Arc::clone(&self.serializer), Arc::clone(&self.publisher))
    }

    // -- identifiers ----------------------------------------------------

    fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
        if value.is_empty()
            || value.trim() != value
            || value.contains('/')
            || value.contains("..")
            || value.contains('\\')
        {
            return Err(Error::Precondition(format!("invalid {} identifier: '{}'", kind, value)));
        }
        Ok(())
    }

    // -- versions ----------------------------------------------------

    pub async fn list_versions(&self) -> Result<Vec<String>> {
        self.serializer
            .read_op(|repo| Ok(repo.list_local_branches()?.into_iter().filter(|b| b != MASTER).collect()))
            .await
    }

    pub async fn has_version(&self, version: &str) -> Result<bool> {
        let version = version.to_string();
        self.serializer.read_op(move |repo| repo.branch_exists(&version)).await
    }

    pub async fn create_version(&self, version: &str) -> Result<()> {
        Self::validate_identifier("version", version)?;
        let version_owned = version.to_string();
        self.serializer
            .write_op(move |repo, ctx| {
                if repo.branch_exists(&version_owned)? {
                    return Err(Error::Precondition(format!("version '{}' already exists", version_owned)));
                }
                repo.create_branch(&version_owned, MASTER)?;
                ctx.push_branch(version_owned.clone());
                ctx.push();
                Ok(())
            })
            .await
    }

    pub async fn create_version_from(&self, new_version: &str, source_version: &str) -> Result<()> {
        Self::validate_identifier("version", new_version)?;
        Self::validate_identifier("version", source_version)?;
        let new_version = new_version.to_string();
        let source_version = source_version.to_string();
        self.serializer
            .write_op(move |repo, ctx| {
                if repo.branch_exists(&new_version)? {
                    return Err(Error::Precondition(format!("version '{}' already exists", new_version)));
                }
                if !repo.branch_exists(&source_version)? {
                    return Err(Error::Precondition(format!("source version '{}' does not exist", source_version)));
                }
                repo.create_branch(&new_version, &source_version)?;
                ctx.push_branch(new_version.clone());
                ctx.push();
                Ok(())
            })
            .await
    }

    /// Version deletion is not supported: fleets that rely on a version
    /// staying addressable for rollback would lose that guarantee.
    pub async fn delete_version(&self, _version: &str) -> Result<()> {
        Err(Error::Unsupported("delete_version"))
    }

    // -- profiles ----------------------------------------------------

    /// Union of the profiles defined on `version` and the cross-version
    /// ("ensemble") profiles held on `master`.
    pub async fn list_profiles(&self, version: &str) -> Result<Vec<String>> {
        Self::validate_identifier("version", version)?;
        let version = version.to_string();
        let mapper = self.mapper;
        self.serializer
            .read_op(move |repo| {
                let mut names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
                let original = repo.current_branch()?;

                if repo.branch_exists(MASTER)? {
                    repo.checkout_branch(MASTER)?;
                    names.extend(mapper.profile_names(&repo.profiles_root())?);
                }
                if version != MASTER && repo.branch_exists(&version)? {
                    repo.checkout_branch(&version)?;
                    names.extend(mapper.profile_names(&repo.profiles_root())?);
                }

                if let Some(original) = original {
                    if repo.current_branch()?.as_deref() != Some(original.as_str()) {
                        repo.checkout_branch(&original)?;
                    }
                }
                Ok(names.into_iter().collect())
            })
            .await
    }

    pub async fn create_profile(&self, version: &str, profile: &str) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let dir = mapper.directory_of(&profile_owned);
                let marker = dir.join(AGENT_PROPERTIES_FILE);
                if repo.read_file(&marker)?.is_some() {
                    return Ok(());
                }
                repo.write_file(&marker, format!("#Profile:{}\n", profile_owned).as_bytes())?;
                ctx.commit(format!("Added profile {}", profile_owned));
                Ok(())
            })
            .await
    }

    pub async fn delete_profile(&self, version: &str, profile: &str) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let dir = mapper.directory_of(&profile_owned);
                repo.remove_path(&dir)?;
                ctx.commit(format!("Removed profile {}", profile_owned));
                Ok(())
            })
            .await
    }

    pub async fn rename_profile(&self, version: &str, profile: &str, new_profile: &str) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        Self::validate_identifier("profile", new_profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let new_profile_owned = new_profile.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let from = repo.path().join(mapper.directory_of(&profile_owned));
                let to = repo.path().join(mapper.directory_of(&new_profile_owned));
                if !from.exists() {
                    return Err(Error::Precondition(format!("profile '{}' does not exist", profile_owned)));
                }
                if to.exists() {
                    return Err(Error::Precondition(format!("profile '{}' already exists", new_profile_owned)));
                }
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::rename(&from, &to)?;
                repo.add_all()?;
                ctx.commit(format!("rename profile {} to {}", profile_owned, new_profile_owned));
                Ok(())
            })
            .await
    }

    // -- raw file configuration ----------------------------------------

    pub async fn get_file_configurations(&self, version: &str, profile: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let mapper = self.mapper;
        self.serializer
            .read_op_on_branch(version, move |repo| {
                let dir = repo.path().join(mapper.directory_of(&profile_owned));
                let mut files = BTreeMap::new();
                if dir.is_dir() {
                    for entry in std::fs::read_dir(&dir)? {
                        let entry = entry?;
                        if entry.path().is_file() {
                            let name = entry.file_name().to_string_lossy().into_owned();
                            let content = std::fs::read(entry.path())?;
                            files.insert(name, content);
                        }
                    }
                }
                Ok(files)
            })
            .await
    }

    /// Replaces the full set of files in a profile with `files`.
    /// Existing files absent from `files` are deleted: the symmetric
    /// difference between old and new file names determines what gets
    /// written versus removed, so an unrelated file nobody re-supplied
    /// does not linger.
    pub async fn set_file_configurations(&self, version: &str, profile: &str, files: BTreeMap<String, Vec<u8>>) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let relative_dir = mapper.directory_of(&profile_owned);
                let dir = repo.path().join(&relative_dir);

                let mut existing = std::collections::BTreeSet::new();
                if dir.is_dir() {
                    for entry in std::fs::read_dir(&dir)? {
                        let entry = entry?;
                        if entry.path().is_file() {
                            existing.insert(entry.file_name().to_string_lossy().into_owned());
                        }
                    }
                }

                for (name, content) in &files {
                    repo.write_file(&relative_dir.join(name), content)?;
                }
                for stale in existing.difference(&files.keys().cloned().collect()) {
                    repo.remove_path(&relative_dir.join(stale))?;
                }

                ctx.commit(format!("update configuration for profile {}", profile_owned));
                Ok(())
            })
            .await
    }

    pub async fn get_file_configuration(&self, version: &str, profile: &str, file_name: &str) -> Result<Option<Vec<u8>>> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let file_name = file_name.to_string();
        let mapper = self.mapper;
        self.serializer
            .read_op_on_branch(version, move |repo| {
                repo.read_file_or_directory(&mapper.directory_of(&profile_owned).join(&file_name))
            })
            .await
    }

    pub async fn set_file_configuration(&self, version: &str, profile: &str, file_name: &str, content: Option<Vec<u8>>) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let file_name_owned = file_name.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let path = mapper.directory_of(&profile_owned).join(&file_name_owned);
                match content {
                    Some(bytes) => repo.write_file(&path, &bytes)?,
                    None => repo.remove_path(&path)?,
                }
                ctx.commit(format!("Updated {} for profile {}", file_name_owned, profile_owned));
                Ok(())
            })
            .await
    }

    // -- PID-keyed configuration sugar ----------------------------------

    pub async fn get_configuration(&self, version: &str, profile: &str, pid: &str) -> Result<BTreeMap<String, String>> {
        let file_name = format!("{}.properties", pid);
        match self.get_file_configuration(version, profile, &file_name).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| Error::Properties(e.to_string()))?;
                crate::properties::decode(&text)
            }
            None => Ok(BTreeMap::new()),
        }
    }

    pub async fn set_configuration(&self, version: &str, profile: &str, pid: &str, values: BTreeMap<String, String>) -> Result<()> {
        let file_name = format!("{}.properties", pid);
        let encoded = crate::properties::encode(&values);
        self.set_file_configuration(version, profile, &file_name, Some(encoded.into_bytes())).await
    }

    // -- history / diff / revert ----------------------------------------

    pub async fn get_file_history(&self, version: &str, profile: &str, file_name: &str, limit: usize) -> Result<Vec<FileRevision>> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version_for_history = version.to_string();
        let profile_owned = profile.to_string();
        let file_name_owned = file_name.to_string();
        let mapper = self.mapper;
        self.serializer
            .read_op(move |repo| {
                let relative = mapper.directory_of(&profile_owned).join(&file_name_owned);
                let oids = repo.file_history(&version_for_history, &relative, limit)?;
                oids.into_iter()
                    .map(|oid| {
                        let message = repo.commit_message(oid)?;
                        Ok(FileRevision { commit_id: oid.to_string(), message })
                    })
                    .collect()
            })
            .await
    }

    pub async fn get_file_diff(&self, version: &str, profile: &str, file_name: &str, from: &str, to: &str) -> Result<String> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let profile_owned = profile.to_string();
        let file_name_owned = file_name.to_string();
        let from = from.to_string();
        let to = to.to_string();
        let mapper = self.mapper;
        self.serializer
            .read_op(move |repo| {
                let relative = mapper.directory_of(&profile_owned).join(&file_name_owned);
                let from_oid = git2::Oid::from_str(&from)?;
                let to_oid = git2::Oid::from_str(&to)?;
                repo.file_diff(from_oid, to_oid, &relative)
            })
            .await
    }

    pub async fn revert(&self, version: &str, profile: &str, file_name: &str, commit_id: &str) -> Result<()> {
        Self::validate_identifier("version", version)?;
        Self::validate_identifier("profile", profile)?;
        let version = version.to_string();
        let profile_owned = profile.to_string();
        let file_name_owned = file_name.to_string();
        let commit_id = commit_id.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version.clone(), move |repo, ctx| {
                let relative = mapper.directory_of(&profile_owned).join(&file_name_owned);
                let oid = git2::Oid::from_str(&commit_id)?;
                repo.revert_file(&version, &relative, oid)?;
                ctx.commit(format!("Reverted {} for profile {} to {}", file_name_owned, profile_owned, commit_id));
                Ok(())
            })
            .await
    }

    // -- legacy import ----------------------------------------------------

    /// Converts any legacy flat-layout profile directories found on
    /// `version` into the hierarchical layout, committing the move.
    pub async fn import_legacy_profiles(&self, version: &str) -> Result<usize> {
        Self::validate_identifier("version", version)?;
        let version = version.to_string();
        let mapper = self.mapper;
        self.serializer
            .write_op_on_existing_branch(version, move |repo, ctx| {
                let root = repo.profiles_root();
                let legacy_dirs = mapper.find_legacy_profile_dirs(&root)?;
                let count = legacy_dirs.len();
                for dir in legacy_dirs {
                    mapper.import_legacy(&dir)?;
                }
                if count > 0 {
                    repo.add_all()?;
                    ctx.commit(format!("import {} legacy profile(s)", count));
                }
                Ok(count)
            })
            .await
    }

    // -- attribute store passthroughs ----------------------------------

    pub fn get_version_attributes(&self, version: &str) -> Result<VersionAttributes> {
        self.attributes.get_version_attributes(version)
    }

    pub fn set_version_attributes(&self, version: &str, attributes: VersionAttributes) -> Result<()> {
        self.attributes.set_version_attributes(version, attributes)
    }

    pub fn fabric_requirements(&self) -> Result<FabricRequirements> {
        self.attributes.fabric_requirements()
    }

    pub fn set_fabric_requirements(&self, requirements: FabricRequirements) -> Result<()> {
        self.attributes.set_fabric_requirements(requirements)
    }

    pub fn ensemble_id(&self) -> Result<Option<String>> {
        self.attributes.ensemble_id()
    }

    pub fn set_ensemble_id(&self, id: &str) -> Result<()> {
        self.attributes.set_ensemble_id(id)
    }

    pub fn ensemble_containers(&self, id: &str) -> Result<Vec<String>> {
        self.attributes.ensemble_containers(id)
    }

    pub fn set_ensemble_containers(&self, id: &str, containers: Vec<String>) -> Result<()> {
        self.attributes.set_ensemble_containers(id, containers)
    }

    /// Best-effort default JVM options read. Per spec, the coordination
    /// service backing this may be disconnected; an empty string is a
    /// valid, tolerated response rather than an error.
    pub fn default_jvm_options(&self) -> Result<String> {
        self.attributes.default_jvm_options()
    }

    pub fn set_default_jvm_options(&self, options: String) -> Result<()> {
        self.attributes.set_default_jvm_options(options)
    }

    pub fn repo_path(&self) -> PathBuf {
        self.serializer.repo_path()
    }
}
