//! The controller: operation state, completion slots and user notifications
//! around the config download, apply pipeline and native host channel.

pub mod errors;
pub mod notify;
pub mod operations;
pub mod state;
pub mod types;

pub use errors::ControllerError;
pub use notify::{success_message, ConsoleNotifier, Notice, Notifier, RecordingNotifier};
pub use operations::Controller;
pub use state::{OperationEvent, OperationState, Phase, TransitionError, TransitionRecord};
pub use types::{
    ApplyOutcome, ApplyRequest, Completion, CompletionSlots, InitializeOutcome, InitializeRequest,
    ReplyOutcome,
};
