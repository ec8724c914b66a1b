use std::fmt;
use std::sync::Arc;

use crate::apply::{ApplyParams, BranchPlan};
use crate::remote_config::Configuration;

/// A completion callback. May fire more than once; callers treat it as "stop
/// showing progress".
#[derive(Clone)]
pub struct Completion(Arc<dyn Fn() + Send + Sync>);

impl Completion {
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// The two pending completion slots. Every host reply fires both.
#[derive(Debug, Default, Clone)]
pub struct CompletionSlots {
    pub on_initialize_done: Completion,
    pub on_apply_done: Completion,
}

impl CompletionSlots {
    pub fn fire_all(&self) {
        self.on_initialize_done.call();
        self.on_apply_done.call();
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitializeRequest {
    /// Locally entered fields: repository URL, GitHub username, token, email, config file id
    pub fields: Configuration,
    pub on_done: Completion,
}

#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub params: ApplyParams,
    pub on_done: Completion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// The host accepted the bootstrap
    Initialized,
    /// The document was downloaded but did not leave a usable config file id;
    /// nothing was sent and initialization stays pending until rerun.
    Parked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub plan: BranchPlan,
    pub artifacts: usize,
    pub pr_url: Option<String>,
}

/// What a successful host reply meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Initialized,
    Applied { pr_url: Option<String> },
}
