//! Publish configuration: locally entered fields merged with the remote
//! `extension-config.json` document.

pub mod fetcher;
pub mod store;

pub use fetcher::{ConfigDocument, ConfigFetchError, ConfigFetcher};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, StoreError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Named configuration fields, spelled the way they appear in storage and in the remote document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    RepositoryUrl,
    GitHubUsername,
    GitHubAccessToken,
    GitHubEmail,
    ApplyUrl,
    RootFolderId,
    ApplyPassword,
    ConfigFileId,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 8] = [
        ConfigKey::RepositoryUrl,
        ConfigKey::GitHubUsername,
        ConfigKey::GitHubAccessToken,
        ConfigKey::GitHubEmail,
        ConfigKey::ApplyUrl,
        ConfigKey::RootFolderId,
        ConfigKey::ApplyPassword,
        ConfigKey::ConfigFileId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::RepositoryUrl => "repositoryUrl",
            ConfigKey::GitHubUsername => "gitHubUsername",
            ConfigKey::GitHubAccessToken => "gitHubAccessToken",
            ConfigKey::GitHubEmail => "gitHubEmail",
            ConfigKey::ApplyUrl => "applyUrl",
            ConfigKey::RootFolderId => "rootFolderId",
            ConfigKey::ApplyPassword => "applyPassword",
            ConfigKey::ConfigFileId => "configFileId",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// Fields never printed in clear text
    pub fn is_secret(self) -> bool {
        matches!(self, ConfigKey::GitHubAccessToken | ConfigKey::ApplyPassword)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The live publish configuration.
///
/// Merging is field-wise: a field present in the incoming document replaces the
/// current value, absent fields are left untouched. An explicit `null` clears a
/// field. Keys that are not one of [`ConfigKey`] are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(rename = "gitHubUsername", skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(rename = "gitHubAccessToken", skip_serializing_if = "Option::is_none")]
    pub github_access_token: Option<String>,
    #[serde(rename = "gitHubEmail", skip_serializing_if = "Option::is_none")]
    pub github_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Configuration {
    fn slot_mut(&mut self, key: ConfigKey) -> &mut Option<String> {
        match key {
            ConfigKey::RepositoryUrl => &mut self.repository_url,
            ConfigKey::GitHubUsername => &mut self.github_username,
            ConfigKey::GitHubAccessToken => &mut self.github_access_token,
            ConfigKey::GitHubEmail => &mut self.github_email,
            ConfigKey::ApplyUrl => &mut self.apply_url,
            ConfigKey::RootFolderId => &mut self.root_folder_id,
            ConfigKey::ApplyPassword => &mut self.apply_password,
            ConfigKey::ConfigFileId => &mut self.config_file_id,
        }
    }

    /// Raw value, possibly empty
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        let value = match key {
            ConfigKey::RepositoryUrl => &self.repository_url,
            ConfigKey::GitHubUsername => &self.github_username,
            ConfigKey::GitHubAccessToken => &self.github_access_token,
            ConfigKey::GitHubEmail => &self.github_email,
            ConfigKey::ApplyUrl => &self.apply_url,
            ConfigKey::RootFolderId => &self.root_folder_id,
            ConfigKey::ApplyPassword => &self.apply_password,
            ConfigKey::ConfigFileId => &self.config_file_id,
        };
        value.as_deref()
    }

    /// Value only when it is set and non-empty
    pub fn usable(&self, key: ConfigKey) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: ConfigKey, value: impl Into<String>) {
        *self.slot_mut(key) = Some(value.into());
    }

    pub fn remove(&mut self, key: ConfigKey) {
        *self.slot_mut(key) = None;
    }

    /// Overlay every field that is set in `other`
    pub fn merge(&mut self, other: &Configuration) {
        for key in ConfigKey::ALL {
            if let Some(value) = other.get(key) {
                self.set(key, value);
            }
        }
        for (name, value) in &other.extra {
            self.extra.insert(name.clone(), value.clone());
        }
    }

    /// Merge a downloaded JSON object wholesale
    pub fn merge_document(&mut self, document: Map<String, Value>) {
        for (name, value) in document {
            match ConfigKey::parse(&name) {
                Some(key) => {
                    *self.slot_mut(key) = match value {
                        Value::Null => None,
                        Value::String(text) => Some(text),
                        other => Some(other.to_string()),
                    };
                }
                None => {
                    self.extra.insert(name, value);
                }
            }
        }
    }

    /// Field names and display values with secrets masked
    pub fn redacted_entries(&self) -> Vec<(ConfigKey, String)> {
        ConfigKey::ALL
            .into_iter()
            .filter_map(|key| {
                self.get(key).map(|value| {
                    let shown = if key.is_secret() && !value.is_empty() {
                        "********".to_string()
                    } else {
                        value.to_string()
                    };
                    (key, shown)
                })
            })
            .collect()
    }
}
