use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::config::RemoteConfig;

/// Build the HTTP client shared by the config download and the apply endpoint
pub fn build_http_client(settings: &RemoteConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.request_timeout())
        .build()
}

/// A response the caller should treat as failed, with whatever body the server sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub status: Option<StatusCode>,
    pub body: String,
}

impl HttpFailure {
    pub fn is_permission_denied(&self) -> bool {
        self.status == Some(StatusCode::FORBIDDEN)
    }

    pub fn from_transport(error: &reqwest::Error) -> Self {
        Self {
            status: error.status(),
            body: error.to_string(),
        }
    }
}

/// Read the whole body of a response, classifying non-2xx statuses as failures
pub async fn read_body(response: Response) -> Result<String, HttpFailure> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| HttpFailure::from_transport(&e))?;

    debug!(status = %status, bytes = body.len(), "HTTP response received");

    if status.is_success() {
        Ok(body)
    } else {
        Err(HttpFailure {
            status: Some(status),
            body,
        })
    }
}
