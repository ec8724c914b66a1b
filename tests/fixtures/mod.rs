//! Shared fixtures: a scripted fake native host over an in-memory duplex stream,
//! and controllers wired to a wiremock server.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ssbird::apply::{ApplyParams, ApplyPipeline};
use ssbird::channel::codec::{read_json, write_json, MAX_INBOUND_FRAME};
use ssbird::channel::{ChannelClient, ChannelReply};
use ssbird::config::RemoteConfig;
use ssbird::controller::{Completion, Controller, InitializeRequest, RecordingNotifier};
use ssbird::http::build_http_client;
use ssbird::remote_config::{ConfigFetcher, ConfigKey, Configuration, MemoryConfigStore};

pub const CONFIG_FILE_ID: &str = "file-1";

/// The host end of the channel
pub struct FakeHost {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeHost {
    pub async fn next_request(&mut self) -> Value {
        read_json(&mut self.reader, MAX_INBOUND_FRAME)
            .await
            .expect("host should receive a request frame")
    }

    pub async fn reply(&mut self, reply: &ChannelReply) {
        write_json(&mut self.writer, reply)
            .await
            .expect("host should write a reply frame");
    }

    /// Write any JSON value as a frame
    pub async fn reply_raw(&mut self, value: &Value) {
        write_json(&mut self.writer, value)
            .await
            .expect("host should write a frame");
    }

    /// Reply to `request`, echoing its id
    pub async fn reply_to(&mut self, request: &Value, mut reply: ChannelReply) {
        reply.request_id = request["requestId"].as_str().map(str::to_string);
        self.reply(&reply).await;
    }

    /// True when no request arrives within a short window
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(50), self.next_request())
            .await
            .is_err()
    }

    /// Read one request and answer it
    pub async fn answer(&mut self, reply: ChannelReply) -> Value {
        let request = self.next_request().await;
        self.reply_to(&request, reply).await;
        request
    }
}

pub fn channel_pair() -> (ChannelClient, FakeHost) {
    let (client_side, host_side) = tokio::io::duplex(256 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let (host_read, host_write) = tokio::io::split(host_side);
    (
        ChannelClient::new(Box::new(client_read), Box::new(client_write)),
        FakeHost {
            reader: host_read,
            writer: host_write,
        },
    )
}

pub fn remote_settings(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        config_url_template: format!("{}/u/{{index}}/uc?export=download&id={{id}}", server.uri()),
        max_config_attempts: 5,
        request_timeout_seconds: 5,
        ..RemoteConfig::default()
    }
}

pub fn local_fields() -> Configuration {
    let mut fields = Configuration::default();
    fields.set(ConfigKey::RepositoryUrl, "https://github.com/acme/sheets.git");
    fields.set(ConfigKey::GitHubUsername, "octo");
    fields.set(ConfigKey::GitHubAccessToken, "ghp_token");
    fields.set(ConfigKey::GitHubEmail, "octo@example.com");
    fields.set(ConfigKey::ConfigFileId, CONFIG_FILE_ID);
    fields
}

pub fn apply_params(spreadsheet_ids: &[&str]) -> ApplyParams {
    ApplyParams {
        spreadsheet_ids: spreadsheet_ids.iter().map(|id| id.to_string()).collect(),
        target_sheet_name: "target".to_string(),
        merge_sheet_names: vec!["s1".to_string(), "s2".to_string()],
        commit_message: "Update sheets".to_string(),
        parent_branch_name: "main".to_string(),
        create_pr: false,
    }
}

/// Serve the config document at identity slot 0
pub async fn mount_config_document(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path("/u/0/uc"))
        .and(query_param("id", CONFIG_FILE_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

pub fn config_document(server: &MockServer) -> Value {
    json!({
        "applyUrl": format!("{}/apply", server.uri()),
        "rootFolderId": "root-9"
    })
}

/// Counts completion invocations
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn completion(&self) -> Completion {
        let count = self.0.clone();
        Completion::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub controller: Controller,
    pub host: FakeHost,
    pub store: Arc<MemoryConfigStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(server: &MockServer) -> Harness {
    harness_with_timeout(server, Duration::from_secs(5))
}

pub fn harness_with_timeout(server: &MockServer, reply_timeout: Duration) -> Harness {
    let settings = remote_settings(server);
    let client = build_http_client(&settings).expect("http client");
    let (channel, host) = channel_pair();
    let store = Arc::new(MemoryConfigStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let controller = Controller::new(
        ConfigFetcher::new(client.clone(), settings),
        ApplyPipeline::new(client),
        channel,
        store.clone(),
        notifier.clone(),
    )
    .with_reply_timeout(reply_timeout);

    Harness {
        controller,
        host,
        store,
        notifier,
    }
}

/// A harness whose host has already accepted the bootstrap
pub async fn initialized_harness(server: &MockServer) -> Harness {
    mount_config_document(server, config_document(server)).await;
    let mut harness = harness(server);

    let (outcome, _) = tokio::join!(
        harness.controller.initialize(InitializeRequest {
            fields: local_fields(),
            on_done: Completion::noop(),
        }),
        harness.host.answer(ChannelReply::success()),
    );
    outcome.expect("bootstrap should succeed");
    assert!(harness.controller.is_initialized());
    harness
}
