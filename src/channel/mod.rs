//! The message channel to the native host process.

pub mod client;
pub mod codec;
pub mod messages;

pub use client::{BoxedReader, BoxedWriter, ChannelClient, PendingRequest};
pub use messages::{ChannelMessage, ChannelReply, CsvArtifact, RequestKind};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Native host closed the channel")]
    Closed,

    #[error("The {pending} request is still waiting for its reply")]
    Busy { pending: RequestKind },

    #[error("Reply for request {received} does not match outstanding request {expected}")]
    MismatchedReply { expected: String, received: String },

    #[error("Channel was abandoned after an unanswered request; restart the host session")]
    Abandoned,

    #[error("Failed to start native host '{command}': {reason}")]
    Spawn { command: String, reason: String },
}
