use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Numeric request discriminator understood by the native host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Initialize = 1,
    Apply = 2,
}

impl Serialize for RequestKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Initialize => f.write_str("initialize"),
            RequestKind::Apply => f.write_str("apply"),
        }
    }
}

/// One sheet rendered as CSV; the host writes `value` to `<path>.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvArtifact {
    pub path: String,
    pub value: String,
}

/// Outbound request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    #[serde(rename_all = "camelCase")]
    Initialize {
        repository_url: String,
        username: String,
        #[serde(rename = "gitHubAccessToken")]
        access_token: String,
    },
    #[serde(rename_all = "camelCase")]
    Apply {
        username: String,
        email: String,
        target_branch_name: String,
        parent_branch_names: Vec<String>,
        commit_message: String,
        #[serde(rename = "createPR")]
        create_pr: bool,
        pr_title: String,
        pr_base_branch_name: String,
        #[serde(rename = "csvs")]
        csv_payloads: Vec<CsvArtifact>,
    },
}

impl ChannelMessage {
    pub fn kind(&self) -> RequestKind {
        match self {
            ChannelMessage::Initialize { .. } => RequestKind::Initialize,
            ChannelMessage::Apply { .. } => RequestKind::Apply,
        }
    }
}

/// Wire form of a request: the body plus `functionType` and `requestId`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope<'a> {
    pub function_type: RequestKind,
    pub request_id: &'a str,
    #[serde(flatten)]
    pub message: &'a ChannelMessage,
}

/// The single reply shape. Hosts are not required to echo `requestId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ChannelReply {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_pr_url(mut self, url: impl Into<String>) -> Self {
        self.pr_url = Some(url.into());
        self
    }

    /// Error text; an empty string counts as success
    pub fn error(&self) -> Option<&str> {
        self.error_message.as_deref().filter(|m| !m.is_empty())
    }

    pub fn pull_request_url(&self) -> Option<&str> {
        self.pr_url.as_deref().filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_envelope_wire_shape() {
        let message = ChannelMessage::Initialize {
            repository_url: "https://github.com/acme/sheets.git".to_string(),
            username: "octo".to_string(),
            access_token: "ghp_x".to_string(),
        };
        let envelope = Envelope {
            function_type: message.kind(),
            request_id: "req-1",
            message: &message,
        };

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "functionType": 1,
                "requestId": "req-1",
                "repositoryUrl": "https://github.com/acme/sheets.git",
                "username": "octo",
                "gitHubAccessToken": "ghp_x"
            })
        );
    }

    #[test]
    fn test_apply_envelope_wire_shape() {
        let message = ChannelMessage::Apply {
            username: "octo".to_string(),
            email: "octo@example.com".to_string(),
            target_branch_name: "s2".to_string(),
            parent_branch_names: vec!["main".to_string(), "target".to_string()],
            commit_message: "update".to_string(),
            create_pr: true,
            pr_title: "[SSBird] s2 to target by octo".to_string(),
            pr_base_branch_name: "target".to_string(),
            csv_payloads: vec![CsvArtifact {
                path: "master/items".to_string(),
                value: "id,name\n1,a\n".to_string(),
            }],
        };
        let envelope = Envelope {
            function_type: message.kind(),
            request_id: "req-2",
            message: &message,
        };
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["functionType"], 2);
        assert_eq!(value["createPR"], true);
        assert_eq!(value["parentBranchNames"], json!(["main", "target"]));
        assert_eq!(value["prBaseBranchName"], "target");
        assert_eq!(value["csvs"][0]["path"], "master/items");
    }

    #[test]
    fn test_reply_empty_error_counts_as_success() {
        let reply: ChannelReply = serde_json::from_str(r#"{"errorMessage":""}"#).unwrap();
        assert_eq!(reply.error(), None);

        let reply: ChannelReply = serde_json::from_str("{}").unwrap();
        assert_eq!(reply, ChannelReply::success());

        let reply: ChannelReply =
            serde_json::from_str(r#"{"errorMessage":"Not changed.","prUrl":""}"#).unwrap();
        assert_eq!(reply.error(), Some("Not changed."));
        assert_eq!(reply.pull_request_url(), None);
    }
}
