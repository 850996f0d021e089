//! App server client facade.
//!
//! [`AppServerClient`] can only be obtained through [`AppServerClient::connect`]
//! (or [`AppServerClient::launch`]), which performs the handshake:
//!
//! 1. **`initialize`**: the first request on the link (id 0) carrying the
//!    client's `clientInfo`; the response is kept as [`InitializeResponse`].
//! 2. **`initialized`**: a notification without params sent once the
//!    response arrived.
//!
//! Every request method then maps to one async call that serializes typed
//! params, goes through the transport's correlator and decodes the typed
//! result.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::models::command::{
    CommandExecParams, CommandExecResponse, ModelListParams, ModelListResponse,
};
use crate::models::handshake::{ClientInfo, InitializeParams, InitializeResponse};
use crate::models::review::{ReviewStartParams, ReviewStartResponse};
use crate::models::thread::{
    ThreadForkParams, ThreadIdParams, ThreadListParams, ThreadListResponse, ThreadReadParams,
    ThreadReadResponse, ThreadResponse, ThreadResumeParams, ThreadStartParams,
};
use crate::models::turn::{
    TurnInterruptParams, TurnStartParams, TurnStartResponse, TurnSteerParams, TurnSteerResponse,
};
use crate::rpc::lifecycle::TransportEvent;
use crate::rpc::router::Subscription;
use crate::rpc::spawner::spawn_app_server;
use crate::rpc::transport::{PeerIo, Transport, TransportOptions};
use crate::{ClientError, Result};

/// Connected, initialized app server session.
#[derive(Debug)]
pub struct AppServerClient {
    transport: Transport,
    server: InitializeResponse,
}

impl AppServerClient {
    /// Spawn the app server described by `config` and connect to it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` when the process cannot be spawned, or any
    /// error from [`AppServerClient::connect`].
    pub async fn launch(config: &ClientConfig) -> Result<Self> {
        let io = spawn_app_server(&config.launch)?;
        Self::connect(io, config.transport_options(), ClientInfo::from(&config.client)).await
    }

    /// Start a transport over `io` and perform the handshake.
    ///
    /// The transport is shut down again if the handshake fails.
    ///
    /// # Errors
    ///
    /// Returns the `initialize` failure (`Rpc`, `Timeout`, transport errors)
    /// or `ClientError::Protocol` for an undecodable response.
    pub async fn connect(
        io: PeerIo,
        options: TransportOptions,
        client_info: ClientInfo,
    ) -> Result<Self> {
        let transport = Transport::connect(io, options);
        match handshake(&transport, client_info).await {
            Ok(server) => Ok(Self { transport, server }),
            Err(err) => {
                warn!(error = %err, "client: handshake failed");
                if let Err(close_err) = transport.shutdown().await {
                    debug!(error = %close_err, "client: shutdown after failed handshake");
                }
                Err(err)
            }
        }
    }

    /// Server details returned by `initialize`.
    #[must_use]
    pub fn server_info(&self) -> &InitializeResponse {
        &self.server
    }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Subscribe to raw inbound notifications.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.transport.subscribe()
    }

    /// Subscribe to transport lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport.events()
    }

    /// Send an arbitrary request with untyped params and result.
    ///
    /// # Errors
    ///
    /// See [`Transport::request`].
    pub async fn request_raw(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.transport.request(method, params, timeout).await
    }

    /// Send `method` with serialized `params` and decode the result.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::request`], or
    /// `ClientError::Protocol` when params or result do not (de)serialize.
    pub async fn request<P, R>(&self, method: &str, params: &P, timeout: Option<Duration>) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| ClientError::Protocol(format!("{method}: invalid params: {e}")))?;
        let result = self.transport.request(method, Some(params), timeout).await?;
        decode_result(method, result)
    }

    /// Shut the session down; see [`Transport::shutdown`].
    ///
    /// # Errors
    ///
    /// See [`Transport::shutdown`].
    pub async fn shutdown(&self) -> Result<()> {
        self.transport.shutdown().await
    }

    // ── thread/* ────────────────────────────────────────────────────────────

    /// `thread/start`: create a thread.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_start(&self, params: &ThreadStartParams) -> Result<ThreadResponse> {
        self.request("thread/start", params, None).await
    }

    /// `thread/resume`: reopen a stored thread.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_resume(&self, params: &ThreadResumeParams) -> Result<ThreadResponse> {
        self.request("thread/resume", params, None).await
    }

    /// `thread/fork`: copy a thread into a new one.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_fork(&self, params: &ThreadForkParams) -> Result<ThreadResponse> {
        self.request("thread/fork", params, None).await
    }

    /// `thread/read`
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_read(&self, params: &ThreadReadParams) -> Result<ThreadReadResponse> {
        self.request("thread/read", params, None).await
    }

    /// `thread/list`
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_list(&self, params: &ThreadListParams) -> Result<ThreadListResponse> {
        self.request("thread/list", params, None).await
    }

    /// `thread/archive`
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_archive(&self, thread_id: &str) -> Result<()> {
        self.request::<_, Value>("thread/archive", &ThreadIdParams::new(thread_id), None)
            .await
            .map(drop)
    }

    /// `thread/compact`: ask the server to summarize older history.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn thread_compact(&self, thread_id: &str) -> Result<()> {
        self.request::<_, Value>("thread/compact", &ThreadIdParams::new(thread_id), None)
            .await
            .map(drop)
    }

    // ── turn/* ──────────────────────────────────────────────────────────────

    /// `turn/start`: begin a turn. Completion is reported by notifications;
    /// see [`run_turn`](crate::aggregator::run_turn) to wait for it.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn turn_start(&self, params: &TurnStartParams) -> Result<TurnStartResponse> {
        self.request("turn/start", params, None).await
    }

    /// `turn/steer`: add input to a running turn.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn turn_steer(&self, params: &TurnSteerParams) -> Result<TurnSteerResponse> {
        self.request("turn/steer", params, None).await
    }

    /// `turn/interrupt`: ask the server to stop a running turn. The turn then
    /// completes with status `interrupted`.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn turn_interrupt(&self, params: &TurnInterruptParams) -> Result<()> {
        self.request::<_, Value>("turn/interrupt", params, None)
            .await
            .map(drop)
    }

    // ── review, models, commands ────────────────────────────────────────────

    /// `review/start`
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn review_start(&self, params: &ReviewStartParams) -> Result<ReviewStartResponse> {
        self.request("review/start", params, None).await
    }

    /// `model/list`
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn model_list(&self, params: &ModelListParams) -> Result<ModelListResponse> {
        self.request("model/list", params, None).await
    }

    /// `command/exec`: run one command in the server's sandbox.
    ///
    /// # Errors
    ///
    /// See [`AppServerClient::request`].
    pub async fn command_exec(&self, params: &CommandExecParams) -> Result<CommandExecResponse> {
        self.request("command/exec", params, None).await
    }
}

async fn handshake(transport: &Transport, client_info: ClientInfo) -> Result<InitializeResponse> {
    let params = serde_json::to_value(InitializeParams { client_info })?;
    let result = transport.request("initialize", Some(params), None).await?;
    let server: InitializeResponse = decode_result("initialize", result)?;
    debug!("handshake: initialize response received");

    transport.notify("initialized", None).await?;
    info!(user_agent = ?server.user_agent, "handshake: complete");
    Ok(server)
}

fn decode_result<R: DeserializeOwned>(method: &str, result: Value) -> Result<R> {
    serde_json::from_value(result)
        .map_err(|e| ClientError::Protocol(format!("{method}: invalid result: {e}")))
}
