// SSBird Library - publish spreadsheets to a Git repository through a native host
// This exposes the core components for testing and integration

pub mod apply;
pub mod channel;
pub mod config;
pub mod controller;
pub mod http;
pub mod remote_config;
pub mod telemetry;

// Re-export key types for easy access
pub use apply::{ApplyParams, ApplyPipeline, BranchPlan, BranchPlanError};
pub use channel::{ChannelClient, ChannelError, ChannelMessage, ChannelReply, CsvArtifact, RequestKind};
pub use crate::config::{config, init_config, SsbirdConfig};
pub use controller::{
    ApplyOutcome, ApplyRequest, Completion, ConsoleNotifier, Controller, ControllerError,
    InitializeOutcome, InitializeRequest, Notifier, Phase,
};
pub use remote_config::{
    ConfigFetcher, ConfigKey, ConfigStore, Configuration, FileConfigStore, MemoryConfigStore,
};
pub use telemetry::{create_operation_span, generate_correlation_id, init_telemetry};
