//! Scripted GraphQL-over-WebSocket server.
//!
//! Speaks just enough of `graphql-ws` and `graphql-transport-ws` to ack
//! connections and record subscribe/stop frames. Tests push events
//! explicitly with [`ScriptedWsServer::push_data`] and friends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tracing::debug;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A completed `connection_init` handshake.
#[derive(Debug, Clone)]
pub struct RecordedHandshake {
    /// Connection index, in accept order.
    pub connection: usize,
    /// `Authorization` header of the upgrade request.
    pub authorization: Option<String>,
    /// Negotiated subprotocol.
    pub subprotocol: Option<String>,
    /// `connection_init` payload.
    pub init_payload: serde_json::Value,
}

/// A `start`/`subscribe` frame.
#[derive(Debug, Clone)]
pub struct StartedOperation {
    /// Connection index.
    pub connection: usize,
    /// Operation id chosen by the client.
    pub id: String,
    /// `operationName` from the payload.
    pub operation_name: Option<String>,
    /// `variables` from the payload.
    pub variables: serde_json::Value,
}

#[derive(Debug)]
struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    subprotocol: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    connections: Vec<Connection>,
    handshakes: Vec<RecordedHandshake>,
    started: Vec<StartedOperation>,
    stopped: Vec<String>,
    terminated: usize,
}

/// A WebSocket server driven by the test.
pub struct ScriptedWsServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    accept_task: JoinHandle<()>,
}

impl ScriptedWsServer {
    /// Bind to an ephemeral local port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind scripted websocket server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(State::default()));
        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });
        Self {
            addr,
            state,
            accept_task,
        }
    }

    /// `ws://` URL of the server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/graphql", self.addr)
    }

    /// Handshakes completed so far.
    #[must_use]
    pub fn handshakes(&self) -> Vec<RecordedHandshake> {
        self.state.lock().handshakes.clone()
    }

    /// Operations started so far.
    #[must_use]
    pub fn started(&self) -> Vec<StartedOperation> {
        self.state.lock().started.clone()
    }

    /// Ids the client stopped so far.
    #[must_use]
    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().stopped.clone()
    }

    /// Number of accepted WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Number of `connection_terminate` frames received.
    #[must_use]
    pub fn terminated(&self) -> usize {
        self.state.lock().terminated
    }

    /// Wait until at least `count` operations have started.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_started(&self, count: usize) -> Vec<StartedOperation> {
        self.wait_until(&format!("{count} started operations"), |state| {
            state.started.len() >= count
        })
        .await;
        self.started()
    }

    /// Wait until the client stops `id`.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_stop(&self, id: &str) {
        self.wait_until(&format!("stop of {id}"), |state| {
            state.stopped.iter().any(|stopped| stopped == id)
        })
        .await;
    }

    /// Wait until `count` connections have been accepted.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_connections(&self, count: usize) {
        self.wait_until(&format!("{count} connections"), |state| {
            state.connections.len() >= count
        })
        .await;
    }

    async fn wait_until(&self, what: &str, done: impl Fn(&State) -> bool) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            if done(&self.state.lock()) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Push a data event to operation `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never started.
    pub fn push_data(&self, id: &str, data: serde_json::Value) {
        self.push(id, |protocol| {
            let message_type = if protocol == Some("graphql-transport-ws") {
                "next"
            } else {
                "data"
            };
            serde_json::json!({ "type": message_type, "id": id, "payload": { "data": data } })
        });
    }

    /// Fail operation `id` with a GraphQL error.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never started.
    pub fn push_error(&self, id: &str, message: &str) {
        self.push(id, |protocol| {
            let payload = if protocol == Some("graphql-transport-ws") {
                serde_json::json!([{ "message": message }])
            } else {
                serde_json::json!({ "message": message })
            };
            serde_json::json!({ "type": "error", "id": id, "payload": payload })
        });
    }

    /// Complete operation `id` from the server side.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never started.
    pub fn complete(&self, id: &str) {
        self.push(id, |_| serde_json::json!({ "type": "complete", "id": id }));
    }

    fn push(&self, id: &str, frame: impl FnOnce(Option<&str>) -> serde_json::Value) {
        let state = self.state.lock();
        let started = state
            .started
            .iter()
            .rev()
            .find(|operation| operation.id == id)
            .unwrap_or_else(|| panic!("operation {id} was never started"));
        let connection = &state.connections[started.connection];
        let frame = frame(connection.subprotocol.as_deref());
        let _ = connection.outbound.send(Message::text(frame.to_string()));
    }

    /// Close every open connection from the server side.
    pub fn disconnect_all(&self) {
        for connection in &self.state.lock().connections {
            let _ = connection.outbound.send(Message::Close(None));
        }
    }
}

impl Drop for ScriptedWsServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.disconnect_all();
    }
}

type Handshake = (Option<String>, Option<String>);

async fn serve(stream: TcpStream, state: Arc<Mutex<State>>) {
    let captured: Arc<Mutex<Handshake>> = Arc::default();
    let callback_capture = Arc::clone(&captured);
    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let subprotocol = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string());
        if let Some(protocol) = subprotocol
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok())
        {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }
        *callback_capture.lock() = (authorization, subprotocol);
        Ok(response)
    };

    let Ok(socket) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (authorization, subprotocol) = captured.lock().clone();
    let (mut sink, mut source) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    let connection = {
        let mut state = state.lock();
        state.connections.push(Connection {
            outbound: outbound.clone(),
            subprotocol: subprotocol.clone(),
        });
        state.connections.len() - 1
    };
    debug!(connection, ?subprotocol, "scripted websocket accepted");

    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                let Some(message) = message else { break };
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
                        continue;
                    };
                    let reply = handle_frame(
                        &state,
                        connection,
                        authorization.as_deref(),
                        subprotocol.as_deref(),
                        &frame,
                    );
                    if let Some(reply) = reply {
                        let _ = outbound.send(Message::text(reply.to_string()));
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn handle_frame(
    state: &Mutex<State>,
    connection: usize,
    authorization: Option<&str>,
    subprotocol: Option<&str>,
    frame: &serde_json::Value,
) -> Option<serde_json::Value> {
    let id = frame["id"].as_str().map(ToString::to_string);
    let mut state = state.lock();
    match frame["type"].as_str()? {
        "connection_init" => {
            state.handshakes.push(RecordedHandshake {
                connection,
                authorization: authorization.map(ToString::to_string),
                subprotocol: subprotocol.map(ToString::to_string),
                init_payload: frame["payload"].clone(),
            });
            Some(serde_json::json!({ "type": "connection_ack" }))
        }
        "start" | "subscribe" => {
            state.started.push(StartedOperation {
                connection,
                id: id?,
                operation_name: frame["payload"]["operationName"]
                    .as_str()
                    .map(ToString::to_string),
                variables: frame["payload"]["variables"].clone(),
            });
            None
        }
        "stop" | "complete" => {
            state.stopped.push(id?);
            None
        }
        "connection_terminate" => {
            state.terminated += 1;
            None
        }
        "ping" => Some(serde_json::json!({ "type": "pong" })),
        _ => None,
    }
}
