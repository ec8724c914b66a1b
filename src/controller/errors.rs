use thiserror::Error;

use super::state::{Phase, TransitionError};
use crate::apply::{ApplyError, BranchPlanError};
use crate::channel::ChannelError;
use crate::remote_config::{ConfigFetchError, StoreError};

/// Every way an initialize or apply call can end badly.
/// `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Failed download extension-config.json.\nCheck Config File Id.\n\n{body}")]
    ConfigDownloadFailed { body: String },

    #[error("Failed apply api.\nCheck applyUrl in extension-config.json.\n\n{body}")]
    ApplyApiFailed {
        body: String,
        needs_authorization: bool,
        apply_url: String,
    },

    #[error("Not found applyUrl or rootFolderId.\nCheck extension-config.json.")]
    MissingConfig,

    #[error("Not found GitHub Username or GitHub Email.\nResave Config.")]
    MissingCredentials,

    #[error("Not changed.")]
    NoChanges,

    #[error("{message}")]
    NativeHostFailed { message: String },

    #[error("Wait initializing...")]
    InitializationPending,

    #[error("Another operation is still running ({phase}).")]
    Busy { phase: Phase },

    #[error("{0}")]
    InvalidBranchPlan(#[from] BranchPlanError),

    #[error("Native host did not answer within {seconds}s.")]
    TimedOut { seconds: u64 },

    #[error("Native host channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal state error: {0}")]
    State(TransitionError),

    #[error("Setup failed: {reason}")]
    Setup { reason: String },
}

impl ControllerError {
    /// URL the user must open before retrying, if any
    pub fn authorization_url(&self) -> Option<&str> {
        match self {
            ControllerError::ApplyApiFailed {
                needs_authorization: true,
                apply_url,
                ..
            } => Some(apply_url.as_str()),
            _ => None,
        }
    }

    pub(crate) fn from_apply(error: ApplyError, apply_url: Option<&str>) -> Self {
        match error {
            ApplyError::MissingConfig => ControllerError::MissingConfig,
            ApplyError::Api {
                body,
                needs_authorization,
                ..
            } => ControllerError::ApplyApiFailed {
                body,
                needs_authorization,
                apply_url: apply_url.unwrap_or_default().to_string(),
            },
            ApplyError::NoChanges => ControllerError::NoChanges,
            ApplyError::MissingCredentials => ControllerError::MissingCredentials,
            ApplyError::InvalidBranchPlan(e) => ControllerError::InvalidBranchPlan(e),
        }
    }
}

impl From<TransitionError> for ControllerError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InitializationPending => ControllerError::InitializationPending,
            TransitionError::Busy { phase } => ControllerError::Busy { phase },
            other => ControllerError::State(other),
        }
    }
}

impl From<ConfigFetchError> for ControllerError {
    fn from(err: ConfigFetchError) -> Self {
        ControllerError::ConfigDownloadFailed {
            body: err.body().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_failure_message_embeds_body() {
        let err: ControllerError = ConfigFetchError::DownloadFailed {
            body: "<html>403</html>".to_string(),
            attempts: 5,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Failed download extension-config.json.\nCheck Config File Id.\n\n<html>403</html>"
        );
    }

    #[test]
    fn test_authorization_url_only_when_needed() {
        let err = ControllerError::from_apply(
            ApplyError::Api {
                spreadsheet_id: "a".to_string(),
                body: "Authorization needed".to_string(),
                needs_authorization: true,
            },
            Some("https://script.example/exec"),
        );
        assert_eq!(err.authorization_url(), Some("https://script.example/exec"));

        let err = ControllerError::from_apply(
            ApplyError::Api {
                spreadsheet_id: "a".to_string(),
                body: "boom".to_string(),
                needs_authorization: false,
            },
            Some("https://script.example/exec"),
        );
        assert_eq!(err.authorization_url(), None);
    }

    #[test]
    fn test_transition_errors_map_to_user_messages() {
        let err: ControllerError = TransitionError::InitializationPending.into();
        assert_eq!(err.to_string(), "Wait initializing...");

        let err: ControllerError = TransitionError::Busy {
            phase: Phase::Applying,
        }
        .into();
        assert_eq!(err.to_string(), "Another operation is still running (applying).");
    }
}
