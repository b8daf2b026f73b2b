/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/mapper.rs
 *
 * Pure functions translating `(version, profile)` pairs into branch
 * names and working-tree paths, and back. Directory walks use an
 * explicit stack rather than recursion, to stay safe on pathological
 * repositories with deep profile hierarchies.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const PROFILES_DIR: &str = "fabric/profiles";
pub const AGENT_PROPERTIES_FILE: &str = "org.fusesource.fabric.agent.properties";
pub const PROFILE_SUFFIX: &str = ".profile";

/// Converts between logical profile ids (`foo-bar`) and their on-disk
/// shape. The profile name is carried alongside the version in
/// `branch_of` even though today it is ignored, so that cross-version
/// profiles can later be routed to `master` without changing callers.
#[derive(Debug, Clone, Copy)]
pub struct Mapper {
    pub hierarchical: bool,
}

impl Default for Mapper {
    fn default() -> Self {
        Self { hierarchical: true }
    }
}

impl Mapper {
    pub fn branch_of(&self, version: &str, _profile: &str) -> String {
        version.to_string()
    }

    fn mapped_relative(&self, profile_id: &str) -> PathBuf {
        if self.hierarchical {
            PathBuf::from(format!("{}{}", profile_id.replace('-', "/"), PROFILE_SUFFIX))
        } else {
            PathBuf::from(profile_id)
        }
    }

    /// Working-tree path of a profile directory, relative to the
    /// repository root.
    pub fn directory_of(&self, profile_id: &str) -> PathBuf {
        Path::new(PROFILES_DIR).join(self.mapped_relative(profile_id))
    }

    /// Recovers profile ids from a profiles-root directory.
    pub fn profile_names(&self, root: &Path) -> Result<Vec<String>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();

        if self.hierarchical {
            let mut stack: Vec<(PathBuf, Vec<String>)> = vec![(root.to_path_buf(), Vec::new())];
            while let Some((dir, segments)) = stack.pop() {
                for entry in std::fs::read_dir(&dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if !path.is_dir() {
                        continue;
                    }
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    if let Some(stripped) = file_name.strip_suffix(PROFILE_SUFFIX) {
                        let mut id_segments = segments.clone();
                        id_segments.push(stripped.to_string());
                        names.push(id_segments.join("-"));
                    } else {
                        let mut next_segments = segments.clone();
                        next_segments.push(file_name);
                        stack.push((path, next_segments));
                    }
                }
            }
        } else {
            for entry in std::fs::read_dir(root)? {
                let entry = entry?;
                if entry.path().is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// True when `dir` looks like a legacy flat profile directory: a
    /// directory named like a profile id, containing at least one
    /// `*.properties` or `*.mvel` file directly inside it.
    pub fn is_legacy_flat_profile_dir(&self, dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if ext == "properties" || ext == "mvel" {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Finds legacy flat profile directories under `root`, stopping the
    /// walk at the first legacy directory found along a given branch
    /// (a legacy profile directory is a leaf by definition).
    pub fn find_legacy_profile_dirs(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            if dir != root && self.is_legacy_flat_profile_dir(&dir)? {
                found.push(dir);
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Converts a legacy flat profile directory in place to the
    /// hierarchical layout, returning the new path.
    pub fn import_legacy(&self, flat_dir: &Path) -> Result<PathBuf> {
        let id = flat_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Precondition("invalid legacy profile directory name".into()))?
            .to_string();
        let parent = flat_dir.parent().unwrap_or_else(|| Path::new("."));
        let target = parent.join(self.mapped_relative(&id));
        if target == flat_dir {
            return Ok(target);
        }
        if let Some(target_parent) = target.parent() {
            std::fs::create_dir_all(target_parent)?;
        }
        std::fs::rename(flat_dir, &target)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hierarchical_directory_of_maps_dashes_to_path_segments() {
        let mapper = Mapper { hierarchical: true };
        assert_eq!(
            mapper.directory_of("foo-bar"),
            PathBuf::from("fabric/profiles/foo/bar.profile")
        );
    }

    #[test]
    fn flat_directory_of_is_identity() {
        let mapper = Mapper { hierarchical: false };
        assert_eq!(mapper.directory_of("foo-bar"), PathBuf::from("fabric/profiles/foo-bar"));
    }

    #[test]
    fn profile_names_round_trips_through_directory_of() {
        let dir = tempdir().unwrap();
        let mapper = Mapper { hierarchical: true };
        std::fs::create_dir_all(dir.path().join("foo/bar.profile")).unwrap();
        std::fs::create_dir_all(dir.path().join("default.profile")).unwrap();
        let mut names = mapper.profile_names(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, vec!["default".to_string(), "foo-bar".to_string()]);
    }

    #[test]
    fn legacy_flat_dir_detected_by_properties_file() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("foo-bar");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("org.fusesource.fabric.agent.properties"), b"#Profile:foo-bar\n").unwrap();
        let mapper = Mapper::default();
        assert!(mapper.is_legacy_flat_profile_dir(&legacy).unwrap());
    }

    #[test]
    fn import_legacy_converts_to_hierarchical_layout() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("foo-bar");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("org.fusesource.fabric.agent.properties"), b"#Profile:foo-bar\n").unwrap();
        let mapper = Mapper::default();
        let target = mapper.import_legacy(&legacy).unwrap();
        assert_eq!(target, dir.path().join("foo/bar.profile"));
        assert!(target.join("org.fusesource.fabric.agent.properties").exists());
        assert!(!legacy.exists());
    }
}
