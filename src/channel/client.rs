use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{read_json, write_json, MAX_INBOUND_FRAME};
use super::messages::{ChannelMessage, ChannelReply, Envelope, RequestKind};
use super::ChannelError;
use crate::config::HostConfig;

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// The request currently waiting for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: String,
    pub kind: RequestKind,
    pub sent_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-slot request/response client over one framed byte stream.
///
/// At most one request is outstanding; `send` while a reply is pending fails with
/// [`ChannelError::Busy`]. After an unanswered request is abandoned, or a read
/// fails partway through a frame, the stream position is unknown, so the client
/// refuses further traffic.
pub struct ChannelClient {
    reader: tokio::sync::Mutex<BoxedReader>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    pending: Mutex<Option<PendingRequest>>,
    abandoned: AtomicBool,
    child: tokio::sync::Mutex<Option<Child>>,
    max_frame: usize,
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("pending", &*lock(&self.pending))
            .field("abandoned", &self.abandoned.load(Ordering::SeqCst))
            .field("max_frame", &self.max_frame)
            .finish()
    }
}

impl ChannelClient {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(Some(writer)),
            pending: Mutex::new(None),
            abandoned: AtomicBool::new(false),
            child: tokio::sync::Mutex::new(None),
            max_frame: MAX_INBOUND_FRAME,
        }
    }

    /// Launch the native host and talk to it over its stdin/stdout
    pub fn spawn(settings: &HostConfig) -> Result<Self, ChannelError> {
        let mut child = Command::new(&settings.command)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChannelError::Spawn {
                command: settings.command.clone(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ChannelError::Spawn {
                command: settings.command.clone(),
                reason: "host stdio was not captured".to_string(),
            });
        };

        info!(command = %settings.command, pid = ?child.id(), "Native host started");

        let mut client = Self::new(Box::new(stdout), Box::new(stdin));
        client.child = tokio::sync::Mutex::new(Some(child));
        Ok(client)
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        lock(&self.pending).clone()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        lock(&self.pending).is_some()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Claim the slot and write the request
    pub async fn send(&self, message: &ChannelMessage) -> Result<PendingRequest, ChannelError> {
        if self.is_abandoned() {
            return Err(ChannelError::Abandoned);
        }

        let request = {
            let mut slot = lock(&self.pending);
            if let Some(outstanding) = slot.as_ref() {
                return Err(ChannelError::Busy {
                    pending: outstanding.kind,
                });
            }
            let request = PendingRequest {
                id: Uuid::new_v4().to_string(),
                kind: message.kind(),
                sent_at: Instant::now(),
            };
            *slot = Some(request.clone());
            request
        };

        let envelope = Envelope {
            function_type: request.kind,
            request_id: &request.id,
            message,
        };

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => write_json(writer.as_mut(), &envelope).await,
                None => Err(ChannelError::Closed),
            }
        };

        if let Err(e) = written {
            lock(&self.pending).take();
            warn!(request_id = %request.id, kind = %request.kind, error = %e, "Failed to send request to host");
            return Err(e);
        }

        debug!(request_id = %request.id, kind = %request.kind, "Request sent to host");
        Ok(request)
    }

    /// Read the next reply and release the slot.
    ///
    /// Returns the request the reply was attributed to, or `None` when nothing
    /// was outstanding. A reply echoing a different `requestId` is rejected.
    pub async fn receive(&self) -> Result<(ChannelReply, Option<PendingRequest>), ChannelError> {
        if self.is_abandoned() {
            return Err(ChannelError::Abandoned);
        }

        let read = {
            let mut reader = self.reader.lock().await;
            read_json::<_, ChannelReply>(reader.as_mut(), self.max_frame).await
        };

        let origin = lock(&self.pending).take();
        let reply = match read {
            Ok(reply) => reply,
            // a bad body still consumed its whole frame; anything else leaves
            // the stream at an unknown offset
            Err(e @ ChannelError::Json(_)) => return Err(e),
            Err(e) => {
                self.abandoned.store(true, Ordering::SeqCst);
                warn!(error = %e, "Channel stream lost framing, abandoning");
                return Err(e);
            }
        };

        if let (Some(echoed), Some(request)) = (reply.request_id.as_deref(), origin.as_ref()) {
            if echoed != request.id {
                return Err(ChannelError::MismatchedReply {
                    expected: request.id.clone(),
                    received: echoed.to_string(),
                });
            }
        }

        if let Some(request) = origin.as_ref() {
            debug!(
                request_id = %request.id,
                kind = %request.kind,
                elapsed_ms = request.sent_at.elapsed().as_millis() as u64,
                "Reply received from host"
            );
        }

        Ok((reply, origin))
    }

    /// Give up on the outstanding request
    pub fn abandon(&self) -> Option<PendingRequest> {
        self.abandoned.store(true, Ordering::SeqCst);
        let dropped = lock(&self.pending).take();
        if let Some(request) = dropped.as_ref() {
            warn!(request_id = %request.id, kind = %request.kind, "Abandoned unanswered host request");
        }
        dropped
    }

    /// Close the host's stdin and wait for it to exit, killing it after `grace`
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ChannelError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            // host exits on EOF
            let _ = writer.shutdown().await;
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(status = %status, "Native host exited");
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Native host did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}
