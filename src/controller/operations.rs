//! Orchestrates initialize and apply against the native host.
//!
//! One operation runs at a time. State lives behind short-lived std mutexes that
//! are never held across an await point, so the operation futures stay `Send`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use super::errors::ControllerError;
use super::notify::{success_message, Notifier};
use super::state::{OperationEvent, OperationState, Phase, TransitionError, TransitionRecord};
use super::types::{
    ApplyOutcome, ApplyRequest, Completion, CompletionSlots, InitializeOutcome, InitializeRequest,
    ReplyOutcome,
};
use crate::apply::{ApplyPipeline, ApplyTarget};
use crate::channel::{ChannelClient, ChannelError, ChannelMessage, ChannelReply, RequestKind};
use crate::config::{HostConfig, SsbirdConfig};
use crate::http::build_http_client;
use crate::remote_config::{ConfigFetcher, ConfigKey, ConfigStore, Configuration};
use crate::telemetry::{create_operation_span, generate_correlation_id};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Controller {
    state: Mutex<OperationState>,
    completions: Mutex<CompletionSlots>,
    configuration: Mutex<Configuration>,
    fetcher: ConfigFetcher,
    pipeline: ApplyPipeline,
    channel: ChannelClient,
    store: Arc<dyn ConfigStore>,
    notifier: Arc<dyn Notifier>,
    reply_timeout: Duration,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("phase", &self.phase())
            .field("initialized", &self.is_initialized())
            .field("channel", &self.channel)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

impl Controller {
    pub fn new(
        fetcher: ConfigFetcher,
        pipeline: ApplyPipeline,
        channel: ChannelClient,
        store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: Mutex::new(OperationState::new()),
            completions: Mutex::new(CompletionSlots::default()),
            configuration: Mutex::new(Configuration::default()),
            fetcher,
            pipeline,
            channel,
            store,
            notifier,
            reply_timeout: HostConfig::default().reply_timeout(),
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Seed the live configuration, e.g. from the local store
    pub fn with_configuration(self, configuration: Configuration) -> Self {
        *lock(&self.configuration) = configuration;
        self
    }

    /// Build the HTTP side from settings and launch the native host
    pub fn connect(
        settings: &SsbirdConfig,
        store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ControllerError> {
        let client = build_http_client(&settings.remote).map_err(|e| ControllerError::Setup {
            reason: format!("HTTP client: {e}"),
        })?;
        let channel = ChannelClient::spawn(&settings.host)?;

        Ok(Self::new(
            ConfigFetcher::new(client.clone(), settings.remote.clone()),
            ApplyPipeline::new(client),
            channel,
            store,
            notifier,
        )
        .with_reply_timeout(settings.host.reply_timeout()))
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase()
    }

    pub fn is_initializing(&self) -> bool {
        lock(&self.state).is_initializing()
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).is_initialized()
    }

    pub fn is_applying(&self) -> bool {
        lock(&self.state).is_applying()
    }

    /// Snapshot of the live configuration
    pub fn configuration(&self) -> Configuration {
        lock(&self.configuration).clone()
    }

    pub fn transition_history(&self) -> Vec<TransitionRecord> {
        lock(&self.state).history().to_vec()
    }

    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    /// Persist the local fields, download the remote document and bootstrap the
    /// host. Host success is silent; every failure is alerted and returned.
    pub async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeOutcome, ControllerError> {
        let correlation_id = generate_correlation_id();
        self.run_initialize(request)
            .instrument(create_operation_span("initialize", &correlation_id))
            .await
    }

    async fn run_initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeOutcome, ControllerError> {
        let InitializeRequest { fields, on_done } = request;

        if let Err(e) = self.transition(OperationEvent::BeginInitialize) {
            on_done.call();
            return Err(self.report(e.into()));
        }
        lock(&self.completions).on_initialize_done = on_done;
        lock(&self.configuration).merge(&fields);

        if let Err(e) = self.store.set(&fields).await {
            return Err(self.abort_initialize(e.into()));
        }

        let config_file_id = lock(&self.configuration)
            .usable(ConfigKey::ConfigFileId)
            .unwrap_or_default()
            .to_string();

        match self.fetcher.fetch(&config_file_id).await {
            Ok(document) => {
                debug!(identity_index = document.identity_index, "Merging config document");
                document.merge_into(&mut lock(&self.configuration));
            }
            Err(e) => {
                lock(&self.configuration).remove(ConfigKey::ConfigFileId);
                if let Err(store_err) = self.store.remove(ConfigKey::ConfigFileId).await {
                    warn!(error = %store_err, "Could not clear stored configFileId");
                }
                return Err(self.abort_initialize(e.into()));
            }
        }

        let message = {
            let config = lock(&self.configuration);
            if config.usable(ConfigKey::ConfigFileId).is_none() {
                None
            } else {
                let field = |key: ConfigKey| config.get(key).unwrap_or_default().to_string();
                Some(ChannelMessage::Initialize {
                    repository_url: field(ConfigKey::RepositoryUrl),
                    username: field(ConfigKey::GitHubUsername),
                    access_token: field(ConfigKey::GitHubAccessToken),
                })
            }
        };

        let Some(message) = message else {
            if let Err(e) = self.transition(OperationEvent::Parked) {
                return Err(self.abort_initialize(e.into()));
            }
            info!("No config file id after download, host bootstrap parked");
            return Ok(InitializeOutcome::Parked);
        };

        self.exchange(message).await?;
        Ok(InitializeOutcome::Initialized)
    }

    /// Render every spreadsheet through the apply endpoint and hand the results
    /// to the host for commit, push and optional pull request.
    pub async fn apply(&self, request: ApplyRequest) -> Result<ApplyOutcome, ControllerError> {
        let correlation_id = generate_correlation_id();
        self.run_apply(request)
            .instrument(create_operation_span("apply", &correlation_id))
            .await
    }

    async fn run_apply(&self, request: ApplyRequest) -> Result<ApplyOutcome, ControllerError> {
        let ApplyRequest { params, on_done } = request;

        if let Err(e) = self.transition(OperationEvent::BeginApply) {
            on_done.call();
            return Err(self.report(e.into()));
        }
        lock(&self.completions).on_apply_done = on_done.clone();

        let config = self.configuration();
        let target = match ApplyTarget::from_configuration(&config) {
            Ok(target) => target,
            Err(e) => return Err(self.abort_apply(&on_done, ControllerError::from_apply(e, None))),
        };

        info!(
            spreadsheets = params.spreadsheet_ids.len(),
            target_sheet = %params.target_sheet_name,
            "Collecting CSV artifacts"
        );
        let artifacts = match self.pipeline.collect_artifacts(&params, &target).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                let err = ControllerError::from_apply(e, Some(&target.apply_url));
                return Err(self.abort_apply(&on_done, err));
            }
        };
        let artifact_count = artifacts.len();

        let prepared = match self.pipeline.prepare(&params, &config, artifacts) {
            Ok(prepared) => prepared,
            Err(e) => {
                let err = ControllerError::from_apply(e, Some(&target.apply_url));
                return Err(self.abort_apply(&on_done, err));
            }
        };

        info!(
            target_branch = %prepared.plan.target_branch_name,
            parents = ?prepared.plan.parent_branch_names,
            create_pr = prepared.plan.creates_pr(),
            artifacts = artifact_count,
            "Sending apply request to host"
        );

        let pr_url = match self.exchange(prepared.message).await? {
            ReplyOutcome::Applied { pr_url } => pr_url,
            ReplyOutcome::Initialized => None,
        };

        Ok(ApplyOutcome {
            plan: prepared.plan,
            artifacts: artifact_count,
            pr_url,
        })
    }

    /// Dispatch one host reply. `origin` is the request the channel matched it
    /// to; without one the reply is attributed from the `initialized` flag.
    fn handle_reply(
        &self,
        reply: ChannelReply,
        origin: Option<RequestKind>,
    ) -> Result<ReplyOutcome, ControllerError> {
        let success = reply.error().is_none();
        let kind = {
            let mut state = lock(&self.state);
            let kind = state.attribute_reply(origin);
            state.handle(OperationEvent::ReplyReceived { kind, success })?;
            kind
        };

        let slots = lock(&self.completions).clone();
        slots.fire_all();

        if let Some(message) = reply.error() {
            return Err(self.report(ControllerError::NativeHostFailed {
                message: message.to_string(),
            }));
        }

        match kind {
            RequestKind::Initialize => {
                info!("Native host initialized");
                Ok(ReplyOutcome::Initialized)
            }
            RequestKind::Apply => {
                let pr_url = reply.pull_request_url().map(str::to_string);
                info!(pr_url = ?pr_url, "Apply finished");
                self.notifier.alert(&success_message(pr_url.as_deref()));
                Ok(ReplyOutcome::Applied { pr_url })
            }
        }
    }

    /// Stop the native host
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.channel.shutdown(SHUTDOWN_GRACE).await?;
        Ok(())
    }

    async fn exchange(&self, message: ChannelMessage) -> Result<ReplyOutcome, ControllerError> {
        let kind = message.kind();

        let request = match self.channel.send(&message).await {
            Ok(request) => request,
            // the slot belongs to whoever sent first; leave their state alone
            Err(e @ ChannelError::Busy { .. }) => return Err(self.report(e.into())),
            Err(e) => return Err(self.fail_exchange(OperationEvent::Abort, e.into())),
        };
        debug!(request_id = %request.id, kind = %kind, "Request sent to host");
        if let Err(e) = self.transition(OperationEvent::RequestSent { kind }) {
            self.channel.abandon();
            return Err(self.fail_exchange(OperationEvent::Abort, e.into()));
        }

        match tokio::time::timeout(self.reply_timeout, self.channel.receive()).await {
            Ok(Ok((reply, origin))) => self.handle_reply(reply, origin.map(|pending| pending.kind)),
            Ok(Err(e)) => Err(self.fail_exchange(OperationEvent::Abort, e.into())),
            Err(_) => {
                self.channel.abandon();
                let err = ControllerError::TimedOut {
                    seconds: self.reply_timeout.as_secs(),
                };
                Err(self.fail_exchange(OperationEvent::TimedOut, err))
            }
        }
    }

    fn transition(&self, event: OperationEvent) -> Result<Phase, TransitionError> {
        lock(&self.state).handle(event)
    }

    /// Return to idle without a host reply
    fn settle(&self, event: OperationEvent) {
        if let Err(e) = self.transition(event) {
            warn!(error = %e, "Could not settle operation state");
        }
    }

    fn abort_initialize(&self, err: ControllerError) -> ControllerError {
        self.settle(OperationEvent::Abort);
        let on_done = lock(&self.completions).on_initialize_done.clone();
        on_done.call();
        self.report(err)
    }

    fn abort_apply(&self, on_done: &Completion, err: ControllerError) -> ControllerError {
        self.settle(OperationEvent::Abort);
        on_done.call();
        self.report(err)
    }

    fn fail_exchange(&self, event: OperationEvent, err: ControllerError) -> ControllerError {
        self.settle(event);
        let slots = lock(&self.completions).clone();
        slots.fire_all();
        self.report(err)
    }

    fn report(&self, err: ControllerError) -> ControllerError {
        warn!(error = %err, "Operation failed");
        self.notifier.alert(&err.to_string());
        if let Some(url) = err.authorization_url() {
            self.notifier.open_url(url);
        }
        err
    }
}
