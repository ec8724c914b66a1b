use serde::{Deserialize, Serialize};

/// What the user asked to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyParams {
    /// Called in this order; artifacts accumulate in this order
    pub spreadsheet_ids: Vec<String>,
    pub target_sheet_name: String,
    /// With `create_pr` the last entry becomes the branch that is pushed
    pub merge_sheet_names: Vec<String>,
    pub commit_message: String,
    pub parent_branch_name: String,
    #[serde(rename = "createPR")]
    pub create_pr: bool,
}

/// Where and how the apply endpoint is reached, taken from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyTarget {
    pub apply_url: String,
    pub root_folder_id: String,
    pub apply_password: Option<String>,
}

/// Body of one apply endpoint call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplyCall<'a> {
    pub spreadsheet_id: &'a str,
    pub target_sheet_name: &'a str,
    pub merge_sheet_names: &'a [String],
    pub not_update_sheet: bool,
    pub root_folder_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_password: Option<&'a str>,
}

/// Reply of the apply endpoint; `csv` is absent when the sheet had no changes
#[derive(Debug, Deserialize)]
pub(crate) struct ApplyResponse {
    #[serde(default)]
    pub csv: Option<serde_json::Value>,
}
