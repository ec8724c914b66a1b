//! Sequential calls to the apply endpoint and assembly of the host request.

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{ApplyCall, ApplyResponse};
use super::{ApplyParams, ApplyTarget, BranchPlan, BranchPlanError};
use crate::channel::{ChannelMessage, CsvArtifact};
use crate::http::{read_body, HttpFailure};
use crate::remote_config::{ConfigKey, Configuration};

/// Marker the apply web app puts in its body when the script needs consent
pub const AUTHORIZATION_NEEDED_MARKER: &str = "Authorization needed";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("applyUrl or rootFolderId missing from the configuration")]
    MissingConfig,

    #[error("apply endpoint failed for spreadsheet {spreadsheet_id}: {body}")]
    Api {
        spreadsheet_id: String,
        body: String,
        needs_authorization: bool,
    },

    #[error("no spreadsheet produced changes")]
    NoChanges,

    #[error("GitHub username or email missing from the configuration")]
    MissingCredentials,

    #[error(transparent)]
    InvalidBranchPlan(#[from] BranchPlanError),
}

impl ApplyTarget {
    /// Both `applyUrl` and `rootFolderId` must be present
    pub fn from_configuration(config: &Configuration) -> Result<Self, ApplyError> {
        match (
            config.usable(ConfigKey::ApplyUrl),
            config.usable(ConfigKey::RootFolderId),
        ) {
            (Some(apply_url), Some(root_folder_id)) => Ok(Self {
                apply_url: apply_url.to_string(),
                root_folder_id: root_folder_id.to_string(),
                apply_password: config.get(ConfigKey::ApplyPassword).map(str::to_string),
            }),
            _ => Err(ApplyError::MissingConfig),
        }
    }
}

/// The request for the host together with the plan it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedApply {
    pub plan: BranchPlan,
    pub message: ChannelMessage,
}

#[derive(Debug, Clone)]
pub struct ApplyPipeline {
    client: Client,
}

impl ApplyPipeline {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Call the endpoint once per spreadsheet, strictly in order, stopping at the
    /// first failure. Responses without a `csv` contribute nothing.
    pub async fn collect_artifacts(
        &self,
        params: &ApplyParams,
        target: &ApplyTarget,
    ) -> Result<Vec<CsvArtifact>, ApplyError> {
        let mut artifacts = Vec::with_capacity(params.spreadsheet_ids.len());

        for (index, spreadsheet_id) in params.spreadsheet_ids.iter().enumerate() {
            let call = ApplyCall {
                spreadsheet_id,
                target_sheet_name: &params.target_sheet_name,
                merge_sheet_names: &params.merge_sheet_names,
                not_update_sheet: params.create_pr,
                root_folder_id: &target.root_folder_id,
                apply_password: target.apply_password.as_deref(),
            };

            let artifact = self
                .call_endpoint(&target.apply_url, &call)
                .await
                .map_err(|failure| {
                    warn!(
                        index,
                        spreadsheet_id = %spreadsheet_id,
                        status = ?failure.status,
                        "Apply endpoint call failed"
                    );
                    ApplyError::Api {
                        spreadsheet_id: spreadsheet_id.clone(),
                        needs_authorization: failure.body.contains(AUTHORIZATION_NEEDED_MARKER),
                        body: failure.body,
                    }
                })?;

            match artifact {
                Some(artifact) => {
                    debug!(index, spreadsheet_id = %spreadsheet_id, path = %artifact.path, "Sheet changed");
                    artifacts.push(artifact);
                }
                None => debug!(index, spreadsheet_id = %spreadsheet_id, "Sheet unchanged"),
            }
        }

        info!(
            spreadsheets = params.spreadsheet_ids.len(),
            artifacts = artifacts.len(),
            "Apply endpoint calls finished"
        );
        Ok(artifacts)
    }

    async fn call_endpoint(
        &self,
        apply_url: &str,
        call: &ApplyCall<'_>,
    ) -> Result<Option<CsvArtifact>, HttpFailure> {
        let response = self
            .client
            .post(apply_url)
            .json(call)
            .send()
            .await
            .map_err(|e| HttpFailure::from_transport(&e))?;
        let status = response.status();
        let body = read_body(response).await?;

        let not_json = |body: String| HttpFailure {
            status: Some(status),
            body,
        };

        let parsed: ApplyResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => return Err(not_json(body)),
        };

        match parsed.csv {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
            Some(Value::String(text)) if text.is_empty() => Ok(None),
            Some(csv) => serde_json::from_value(csv)
                .map(Some)
                .map_err(|_| not_json(body)),
        }
    }

    /// Check credentials, compute the branch plan and build the host request
    pub fn prepare(
        &self,
        params: &ApplyParams,
        config: &Configuration,
        artifacts: Vec<CsvArtifact>,
    ) -> Result<PreparedApply, ApplyError> {
        if artifacts.is_empty() {
            return Err(ApplyError::NoChanges);
        }

        let (Some(username), Some(email)) = (
            config.usable(ConfigKey::GitHubUsername),
            config.usable(ConfigKey::GitHubEmail),
        ) else {
            return Err(ApplyError::MissingCredentials);
        };

        let plan = BranchPlan::compute(params, username)?;
        let message = ChannelMessage::Apply {
            username: username.to_string(),
            email: email.to_string(),
            target_branch_name: plan.target_branch_name.clone(),
            parent_branch_names: plan.parent_branch_names.clone(),
            commit_message: params.commit_message.clone(),
            create_pr: params.create_pr,
            pr_title: plan.pr_title.clone(),
            pr_base_branch_name: plan.pr_base_branch_name.clone(),
            csv_payloads: artifacts,
        };

        Ok(PreparedApply { plan, message })
    }
}
