//! GraphQL over WebSocket subscriptions.
//!
//! All subscriptions of a [`GraphqlSubscriptionClient`] share one socket.
//! A background driver task owns the connection and routes server pushes
//! to per-subscription channels by operation id.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use rocket_credentials::CredentialStore;
use rocket_streaming::{WsClient, WsConfig, WsConnection, WsMessage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{AuthFailure, GraphqlClientError, GraphqlError};
use crate::operation::{GraphqlOperation, GraphqlResponse, OperationResult};

/// Wire protocol spoken over the subscription socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WsProtocol {
    /// Legacy `subscriptions-transport-ws` protocol.
    #[default]
    GraphqlWs,
    /// The `graphql-ws` library protocol.
    GraphqlTransportWs,
}

impl WsProtocol {
    /// Value sent in `Sec-WebSocket-Protocol`.
    #[must_use]
    pub const fn subprotocol(self) -> &'static str {
        match self {
            Self::GraphqlWs => "graphql-ws",
            Self::GraphqlTransportWs => "graphql-transport-ws",
        }
    }

    const fn start_type(self) -> &'static str {
        match self {
            Self::GraphqlWs => "start",
            Self::GraphqlTransportWs => "subscribe",
        }
    }

    const fn stop_type(self) -> &'static str {
        match self {
            Self::GraphqlWs => "stop",
            Self::GraphqlTransportWs => "complete",
        }
    }
}

impl std::fmt::Display for WsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subprotocol())
    }
}

impl FromStr for WsProtocol {
    type Err = GraphqlClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "graphql-ws" => Ok(Self::GraphqlWs),
            "graphql-transport-ws" => Ok(Self::GraphqlTransportWs),
            other => Err(GraphqlClientError::Protocol {
                message: format!("unknown websocket protocol: {other}"),
            }),
        }
    }
}

/// GraphQL WebSocket frame, shared by both protocols.
#[derive(Debug, Serialize, Deserialize)]
struct GraphqlWsMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

impl GraphqlWsMessage {
    fn new(message_type: &str, id: Option<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            message_type: message_type.to_string(),
            id,
            payload,
        }
    }
}

/// Subscription configuration.
#[derive(Debug, Clone)]
pub struct GraphqlSubscriptionConfig {
    /// WebSocket configuration.
    pub ws: WsConfig,
    /// Wire protocol.
    pub protocol: WsProtocol,
    /// Initial payload for connection_init. The bearer token is merged in
    /// under `Authorization` when a credential is stored.
    pub init_payload: Option<serde_json::Value>,
    /// Time to wait for connection_ack.
    pub ack_timeout: Duration,
}

impl Default for GraphqlSubscriptionConfig {
    fn default() -> Self {
        Self {
            ws: WsConfig::default(),
            protocol: WsProtocol::default(),
            init_payload: None,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

type RawEvent = Result<GraphqlResponse<serde_json::Value>, GraphqlClientError>;
type EventSender = mpsc::UnboundedSender<RawEvent>;

#[derive(Debug)]
enum Command {
    Start {
        id: String,
        payload: serde_json::Value,
        events: EventSender,
    },
    Stop {
        id: String,
    },
}

#[derive(Debug)]
struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    token: Option<String>,
}

/// GraphQL subscription client.
pub struct GraphqlSubscriptionClient {
    url: String,
    service_name: String,
    config: GraphqlSubscriptionConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    connection: tokio::sync::Mutex<Option<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for GraphqlSubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlSubscriptionClient")
            .field("url", &self.url)
            .field("service_name", &self.service_name)
            .field("protocol", &self.config.protocol)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl GraphqlSubscriptionClient {
    /// Create a new subscription client.
    #[must_use]
    pub fn new(url: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_name: service_name.into(),
            config: GraphqlSubscriptionConfig::default(),
            credentials: None,
            connection: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set configuration.
    #[must_use]
    pub fn with_config(mut self, config: GraphqlSubscriptionConfig) -> Self {
        self.config = config;
        self
    }

    /// Authenticate the connection with the credential in `store`.
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wire protocol in use.
    #[must_use]
    pub const fn protocol(&self) -> WsProtocol {
        self.config.protocol
    }

    /// Subscribe to a typed GraphQL operation.
    ///
    /// Dropping the returned stream stops the subscription.
    pub async fn subscribe<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> Result<GraphqlSubscriptionStream<O::ResponseData>, GraphqlClientError> {
        if O::requires_auth() {
            if let Some(reason) = self.auth_failure()? {
                return Err(GraphqlClientError::AuthenticationRequired {
                    operation: O::OPERATION_NAME.to_string(),
                    reason,
                });
            }
        }
        let payload = serde_json::json!({
            "query": O::QUERY,
            "operationName": O::OPERATION_NAME,
            "variables": serde_json::to_value(&variables)?,
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (events, receiver) = mpsc::unbounded_channel();

        let command = Command::Start {
            id: id.clone(),
            payload,
            events,
        };
        let mut commands = self.connection().await?;
        if let Err(mpsc::error::SendError(command)) = commands.send(command) {
            // The driver exited after the lookup; reconnect once.
            commands = self.connection().await?;
            commands
                .send(command)
                .map_err(|_| GraphqlClientError::Subscription {
                    message: format!("{} subscription connection unavailable", self.service_name),
                })?;
        }

        debug!(
            service = %self.service_name,
            operation = O::OPERATION_NAME,
            id = %id,
            "subscription started"
        );
        Ok(GraphqlSubscriptionStream {
            id,
            inner: UnboundedReceiverStream::new(receiver),
            commands,
            _marker: PhantomData,
        })
    }

    fn auth_failure(&self) -> Result<Option<AuthFailure>, GraphqlClientError> {
        let Some(store) = &self.credentials else {
            return Ok(Some(AuthFailure::MissingCredential));
        };
        Ok(match store.get()? {
            None => Some(AuthFailure::MissingCredential),
            Some(credential) if credential.is_expired() => Some(AuthFailure::CredentialExpired),
            Some(_) => None,
        })
    }

    fn current_token(&self) -> Result<Option<String>, GraphqlClientError> {
        let Some(store) = &self.credentials else {
            return Ok(None);
        };
        Ok(store
            .get()?
            .filter(|credential| !credential.is_expired())
            .map(|credential| credential.token().to_string()))
    }

    /// Shared connection, reconnecting when the driver has exited or the
    /// stored token changed since it was opened.
    async fn connection(&self) -> Result<mpsc::UnboundedSender<Command>, GraphqlClientError> {
        let token = self.current_token()?;
        let mut guard = self.connection.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.commands.is_closed() && handle.token == token {
                return Ok(handle.commands.clone());
            }
        }

        let connection = self.open(token.as_deref()).await?;
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drive(
            connection,
            receiver,
            self.config.protocol,
            self.service_name.clone(),
        ));
        *guard = Some(ConnectionHandle {
            commands: commands.clone(),
            token,
        });
        Ok(commands)
    }

    async fn open(&self, token: Option<&str>) -> Result<WsConnection, GraphqlClientError> {
        let protocol = self.config.protocol;
        let mut ws_config = self.config.ws.clone().with_subprotocol(protocol.subprotocol());
        if let Some(token) = token {
            ws_config = ws_config.with_header("Authorization", format!("Bearer {token}"));
        }
        let client = WsClient::with_config(self.url.clone(), ws_config);
        let mut connection =
            client
                .connect()
                .await
                .map_err(|err| GraphqlClientError::Subscription {
                    message: format!("{} websocket connect failed: {err}", self.service_name),
                })?;

        let mut payload = self
            .config
            .init_payload
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if let (Some(token), Some(fields)) = (token, payload.as_object_mut()) {
            fields.insert(
                "Authorization".to_string(),
                serde_json::Value::String(format!("Bearer {token}")),
            );
        }
        let init = GraphqlWsMessage::new("connection_init", None, Some(payload));
        connection.send_json(&init).await?;

        match tokio::time::timeout(self.config.ack_timeout, await_ack(&mut connection)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(GraphqlClientError::Subscription {
                    message: format!("{} connection_ack timeout", self.service_name),
                });
            }
        }

        info!(
            service = %self.service_name,
            url = %self.url,
            protocol = %protocol,
            authenticated = token.is_some(),
            "subscription connection established"
        );
        Ok(connection)
    }
}

async fn await_ack(connection: &mut WsConnection) -> Result<(), GraphqlClientError> {
    loop {
        let Some(message) = connection.recv().await? else {
            return Err(GraphqlClientError::Subscription {
                message: "connection closed before ack".to_string(),
            });
        };
        match message {
            WsMessage::Ping(data) => connection.send(WsMessage::Pong(data)).await?,
            WsMessage::Pong(_) => {}
            WsMessage::Close(frame) => {
                return Err(GraphqlClientError::Subscription {
                    message: format!(
                        "connection closed before ack: {}",
                        frame.map(|frame| frame.reason).unwrap_or_default()
                    ),
                });
            }
            data @ (WsMessage::Text(_) | WsMessage::Binary(_)) => {
                let frame: GraphqlWsMessage = data.json()?;
                match frame.message_type.as_str() {
                    "connection_ack" => return Ok(()),
                    "ka" | "pong" => {}
                    "ping" => {
                        let pong = GraphqlWsMessage::new("pong", None, frame.payload);
                        connection.send_json(&pong).await?;
                    }
                    "connection_error" => {
                        return Err(GraphqlClientError::Subscription {
                            message: format!(
                                "connection rejected: {}",
                                frame.payload.unwrap_or_default()
                            ),
                        });
                    }
                    other => {
                        return Err(GraphqlClientError::Protocol {
                            message: format!("expected connection_ack, got {other}"),
                        });
                    }
                }
            }
        }
    }
}

/// Owns the socket until every command sender is gone or the connection fails.
async fn drive(
    mut connection: WsConnection,
    mut commands: mpsc::UnboundedReceiver<Command>,
    protocol: WsProtocol,
    service_name: String,
) {
    let mut active: HashMap<String, EventSender> = HashMap::new();

    let failure = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start { id, payload, events }) => {
                    let start = GraphqlWsMessage::new(protocol.start_type(), Some(id.clone()), Some(payload));
                    if let Err(err) = connection.send_json(&start).await {
                        let _ = events.send(Err(err.clone().into()));
                        break Some(err.to_string());
                    }
                    active.insert(id, events);
                }
                Some(Command::Stop { id }) => {
                    if active.remove(&id).is_some() {
                        debug!(service = %service_name, id = %id, "stopping subscription");
                        let stop = GraphqlWsMessage::new(protocol.stop_type(), Some(id), None);
                        if let Err(err) = connection.send_json(&stop).await {
                            break Some(err.to_string());
                        }
                    }
                }
                None => {
                    if protocol == WsProtocol::GraphqlWs {
                        let terminate = GraphqlWsMessage::new("connection_terminate", None, None);
                        let _ = connection.send_json(&terminate).await;
                    }
                    let _ = connection.close().await;
                    break None;
                }
            },
            message = connection.recv() => match message {
                Ok(Some(message)) => {
                    if let Err(reason) = route(&mut connection, &mut active, protocol, message).await {
                        break Some(reason);
                    }
                }
                Ok(None) => break Some("connection closed".to_string()),
                Err(err) => break Some(err.to_string()),
            },
        }
    };

    // Sends fail from here on; `subscribe` reconnects on a failed send.
    commands.close();
    let reason = match failure {
        Some(reason) => {
            warn!(
                service = %service_name,
                active = active.len(),
                reason = %reason,
                "subscription connection failed"
            );
            reason
        }
        None => {
            debug!(service = %service_name, "subscription connection closed");
            "connection closed".to_string()
        }
    };
    for (_, events) in active.drain() {
        let _ = events.send(Err(GraphqlClientError::Subscription {
            message: reason.clone(),
        }));
    }
    while let Ok(command) = commands.try_recv() {
        if let Command::Start { id, events, .. } = command {
            debug!(service = %service_name, id = %id, "start queued behind a lost connection");
            let _ = events.send(Err(GraphqlClientError::Subscription {
                message: reason.clone(),
            }));
        }
    }
}

/// Handle one inbound message. `Err` ends the connection.
async fn route(
    connection: &mut WsConnection,
    active: &mut HashMap<String, EventSender>,
    protocol: WsProtocol,
    message: WsMessage,
) -> Result<(), String> {
    let frame: GraphqlWsMessage = match message {
        WsMessage::Ping(data) => {
            return connection
                .send(WsMessage::Pong(data))
                .await
                .map_err(|err| err.to_string());
        }
        WsMessage::Pong(_) => return Ok(()),
        WsMessage::Close(frame) => {
            return Err(format!(
                "closed by server: {}",
                frame.map(|frame| frame.reason).unwrap_or_default()
            ));
        }
        data => data
            .json()
            .map_err(|err| format!("undecodable frame: {err}"))?,
    };

    match (frame.message_type.as_str(), frame.id) {
        ("data" | "next", Some(id)) => {
            let Some(events) = active.get(&id) else {
                return Ok(());
            };
            let event = serde_json::from_value::<GraphqlResponse<serde_json::Value>>(
                frame.payload.unwrap_or_default(),
            )
            .map_err(GraphqlClientError::from);
            if events.send(event).is_err() {
                active.remove(&id);
                let stop = GraphqlWsMessage::new(protocol.stop_type(), Some(id), None);
                connection
                    .send_json(&stop)
                    .await
                    .map_err(|err| err.to_string())?;
            }
        }
        ("error", Some(id)) => {
            if let Some(events) = active.remove(&id) {
                let errors = parse_errors(frame.payload);
                let _ = events.send(Err(GraphqlClientError::GraphqlErrors { errors }));
            }
        }
        ("complete", Some(id)) => {
            active.remove(&id);
        }
        ("ka" | "pong", _) => {}
        ("ping", _) => {
            let pong = GraphqlWsMessage::new("pong", None, frame.payload);
            connection
                .send_json(&pong)
                .await
                .map_err(|err| err.to_string())?;
        }
        ("connection_error", _) => {
            return Err(format!(
                "connection error: {}",
                frame.payload.unwrap_or_default()
            ));
        }
        (other, id) => warn!(message_type = other, id = ?id, "ignoring unexpected frame"),
    }
    Ok(())
}

fn parse_errors(payload: Option<serde_json::Value>) -> Vec<GraphqlError> {
    match payload {
        Some(value @ serde_json::Value::Array(_)) => {
            serde_json::from_value(value).unwrap_or_default()
        }
        Some(value) => serde_json::from_value::<GraphqlError>(value.clone())
            .map_or_else(|_| vec![GraphqlError::new(value.to_string())], |err| vec![err]),
        None => vec![GraphqlError::new("subscription failed")],
    }
}

/// Typed stream of subscription events.
///
/// Ends after a server error, a server `complete`, or a connection
/// failure (which is delivered as one final `Err`).
pub struct GraphqlSubscriptionStream<T> {
    id: String,
    inner: UnboundedReceiverStream<RawEvent>,
    commands: mpsc::UnboundedSender<Command>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for GraphqlSubscriptionStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlSubscriptionStream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T> GraphqlSubscriptionStream<T> {
    /// Operation id on the shared connection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T: DeserializeOwned> Stream for GraphqlSubscriptionStream<T> {
    type Item = OperationResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner
            .poll_next_unpin(cx)
            .map(|item| item.map(|event| event.and_then(GraphqlResponse::into_typed)))
    }
}

impl<T> Drop for GraphqlSubscriptionStream<T> {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop {
            id: self.id.clone(),
        });
    }
}

/// Callback-style subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`SubscriptionHandle::cancel`] to stop it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: String,
    commands: mpsc::UnboundedSender<Command>,
    live: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn spawn<T, F>(stream: GraphqlSubscriptionStream<T>, mut on_event: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(OperationResult<T>) + Send + 'static,
    {
        let id = stream.id.clone();
        let commands = stream.commands.clone();
        let live = Arc::new(Mutex::new(true));
        let gate = Arc::clone(&live);
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                let live = gate.lock();
                if !*live {
                    break;
                }
                on_event(event);
            }
            *gate.lock() = false;
        });
        Self {
            id,
            commands,
            live,
            task,
        }
    }

    /// Operation id on the shared connection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` until the subscription is cancelled or ends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.live.lock() && !self.task.is_finished()
    }

    /// Stop the subscription. Idempotent.
    ///
    /// Waits for an in-progress callback to return; no callback runs after
    /// this returns. Must not be called from inside the callback.
    pub fn cancel(&self) {
        *self.live.lock() = false;
        let _ = self.commands.send(Command::Stop {
            id: self.id.clone(),
        });
        self.task.abort();
    }
}
