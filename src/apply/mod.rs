//! The apply workflow: per-spreadsheet endpoint calls and the branch plan.

pub mod branch_plan;
pub mod pipeline;
pub mod types;

pub use branch_plan::{BranchPlan, BranchPlanError};
pub use pipeline::{ApplyError, ApplyPipeline, PreparedApply, AUTHORIZATION_NEEDED_MARKER};
pub use types::{ApplyParams, ApplyTarget};
