//! Download of the remote config document with identity-slot rotation.
//!
//! The same document is reachable under several identity slots
//! (`/u/0/`, `/u/1/`, ...). A slot that answers 403 is skipped in favour of the
//! next one; any other failure stops immediately.

use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Configuration;
use crate::config::RemoteConfig;
use crate::http::{read_body, HttpFailure};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigFetchError {
    #[error("config download failed after {attempts} attempt(s): {body}")]
    DownloadFailed { body: String, attempts: u32 },
}

impl ConfigFetchError {
    pub fn body(&self) -> &str {
        match self {
            ConfigFetchError::DownloadFailed { body, .. } => body,
        }
    }
}

/// The downloaded JSON object, not yet merged anywhere
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDocument {
    pub identity_index: u32,
    pub fields: Map<String, Value>,
}

impl ConfigDocument {
    /// Overlay onto `config`; explicit nulls clear fields
    pub fn merge_into(self, config: &mut Configuration) {
        config.merge_document(self.fields);
    }

    pub fn into_configuration(self) -> Configuration {
        let mut config = Configuration::default();
        self.merge_into(&mut config);
        config
    }
}

/// Fetches `extension-config.json` by document id
#[derive(Debug, Clone)]
pub struct ConfigFetcher {
    client: Client,
    settings: RemoteConfig,
}

impl ConfigFetcher {
    pub fn new(client: Client, settings: RemoteConfig) -> Self {
        Self { client, settings }
    }

    /// Download the document. Not cached: every call goes to the network.
    pub async fn fetch(&self, config_file_id: &str) -> Result<ConfigDocument, ConfigFetchError> {
        let max_attempts = self.settings.max_config_attempts.max(1);
        let mut last_failure = None;

        for index in 0..max_attempts {
            match self.attempt(index, config_file_id).await {
                Ok(fields) => {
                    info!(
                        identity_index = index,
                        fields = fields.len(),
                        "Downloaded config document"
                    );
                    return Ok(ConfigDocument {
                        identity_index: index,
                        fields,
                    });
                }
                Err(failure) if failure.is_permission_denied() => {
                    warn!(identity_index = index, "Config download refused, trying next identity");
                    last_failure = Some(failure);
                }
                Err(failure) => {
                    warn!(
                        identity_index = index,
                        status = ?failure.status,
                        "Config download failed"
                    );
                    return Err(ConfigFetchError::DownloadFailed {
                        body: failure.body,
                        attempts: index + 1,
                    });
                }
            }
        }

        Err(ConfigFetchError::DownloadFailed {
            body: last_failure.map(|failure| failure.body).unwrap_or_default(),
            attempts: max_attempts,
        })
    }

    async fn attempt(&self, index: u32, config_file_id: &str) -> Result<Map<String, Value>, HttpFailure> {
        let url = self.settings.config_url(index, config_file_id);
        debug!(identity_index = index, url = %url, "Requesting config document");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HttpFailure::from_transport(&e))?;
        let status = response.status();
        let body = read_body(response).await?;

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(document)) => Ok(document),
            _ => Err(HttpFailure {
                status: Some(status),
                body,
            }),
        }
    }
}
