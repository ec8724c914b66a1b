use serde::Serialize;
use thiserror::Error;

use super::ApplyParams;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BranchPlanError {
    #[error("Create PR needs at least one merge sheet name.")]
    NoMergeSheet,
}

/// Branches the host should build from, push to, and optionally open a PR between
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPlan {
    pub target_branch_name: String,
    pub parent_branch_names: Vec<String>,
    /// Empty when no pull request is requested
    pub pr_title: String,
    /// Empty when no pull request is requested
    pub pr_base_branch_name: String,
}

impl BranchPlan {
    pub fn compute(params: &ApplyParams, username: &str) -> Result<Self, BranchPlanError> {
        if !params.create_pr {
            let mut parent_branch_names = Vec::with_capacity(params.merge_sheet_names.len() + 1);
            parent_branch_names.push(params.parent_branch_name.clone());
            parent_branch_names.extend(params.merge_sheet_names.iter().cloned());

            return Ok(Self {
                target_branch_name: params.target_sheet_name.clone(),
                parent_branch_names,
                pr_title: String::new(),
                pr_base_branch_name: String::new(),
            });
        }

        let target = params
            .merge_sheet_names
            .last()
            .ok_or(BranchPlanError::NoMergeSheet)?;
        let base = &params.target_sheet_name;

        Ok(Self {
            target_branch_name: target.clone(),
            parent_branch_names: vec![params.parent_branch_name.clone(), base.clone()],
            pr_title: format!("[SSBird] {target} to {base} by {username}"),
            pr_base_branch_name: base.clone(),
        })
    }

    pub fn creates_pr(&self) -> bool {
        !self.pr_base_branch_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(create_pr: bool, merge_sheet_names: &[&str]) -> ApplyParams {
        ApplyParams {
            spreadsheet_ids: vec!["sheet-a".to_string()],
            target_sheet_name: "target".to_string(),
            merge_sheet_names: merge_sheet_names.iter().map(|s| s.to_string()).collect(),
            commit_message: "update".to_string(),
            parent_branch_name: "main".to_string(),
            create_pr,
        }
    }

    #[test]
    fn test_plan_without_pr_chains_merge_sheets_after_parent() {
        let plan = BranchPlan::compute(&params(false, &["s1", "s2"]), "octo").unwrap();
        assert_eq!(plan.target_branch_name, "target");
        assert_eq!(plan.parent_branch_names, vec!["main", "s1", "s2"]);
        assert_eq!(plan.pr_title, "");
        assert_eq!(plan.pr_base_branch_name, "");
        assert!(!plan.creates_pr());
    }

    #[test]
    fn test_plan_with_pr_targets_last_merge_sheet() {
        let plan = BranchPlan::compute(&params(true, &["s1", "s2"]), "octo").unwrap();
        assert_eq!(plan.target_branch_name, "s2");
        assert_eq!(plan.parent_branch_names, vec!["main", "target"]);
        assert_eq!(plan.pr_base_branch_name, "target");
        assert_eq!(plan.pr_title, "[SSBird] s2 to target by octo");
        assert!(plan.creates_pr());
    }

    #[test]
    fn test_plan_with_pr_and_no_merge_sheet_is_rejected() {
        let result = BranchPlan::compute(&params(true, &[]), "octo");
        assert_eq!(result, Err(BranchPlanError::NoMergeSheet));
    }

    #[test]
    fn test_plan_without_pr_and_no_merge_sheet_uses_parent_only() {
        let plan = BranchPlan::compute(&params(false, &[]), "octo").unwrap();
        assert_eq!(plan.parent_branch_names, vec!["main"]);
    }
}
