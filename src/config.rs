/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/config.rs
 *
 * Recognized configuration options for the data store plugin. Mirrors
 * the shape of `git_sync::config::SyncConfig` in spirit: a plain
 * `serde`-deserializable struct with `camelCase` JSON keys. Unrecognized
 * keys are simply not captured by `serde` — no `deny_unknown_fields`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use serde::Deserialize;

use crate::credentials::Credentials;

fn default_pull_period() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStoreConfig {
    pub git_remote_url: Option<String>,
    pub git_remote_user: Option<String>,
    pub git_remote_password: Option<String>,
    #[serde(default = "default_pull_period")]
    pub git_pull_period: u64,
    pub data_store_type: Option<String>,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            git_remote_url: None,
            git_remote_user: None,
            git_remote_password: None,
            git_pull_period: default_pull_period(),
            data_store_type: None,
        }
    }
}

impl DataStoreConfig {
    /// Presence of both `gitRemoteUser` and `gitRemotePassword` switches
    /// credential resolution to the "external"/static mode.
    pub fn static_credentials(&self) -> Option<Credentials> {
        match (&self.git_remote_user, &self.git_remote_password) {
            (Some(user), Some(password)) => Some(Credentials {
                username: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pull_period_when_absent() {
        let config: DataStoreConfig = serde_json::from_str(r#"{"gitRemoteUrl":"https://example/repo"}"#).unwrap();
        assert_eq!(config.git_pull_period, 1000);
        assert_eq!(config.git_remote_url.as_deref(), Some("https://example/repo"));
    }

    #[test]
    fn drops_unrecognized_keys() {
        let config: DataStoreConfig =
            serde_json::from_str(r#"{"gitPullPeriod": 2500, "somethingUnknown": "ignored"}"#).unwrap();
        assert_eq!(config.git_pull_period, 2500);
    }

    #[test]
    fn static_credentials_require_both_fields() {
        let mut config = DataStoreConfig::default();
        assert!(config.static_credentials().is_none());
        config.git_remote_user = Some("bot".into());
        assert!(config.static_credentials().is_none());
        config.git_remote_password = Some("secret".into());
        let creds = config.static_credentials().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password, "secret");
    }
}
