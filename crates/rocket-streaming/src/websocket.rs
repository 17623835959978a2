//! Handshake-aware WebSocket connections for subscription transports.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::{StreamError, StreamResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A frame as seen by subscription code, detached from tungstenite types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<WsCloseFrame>),
}

impl WsMessage {
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text(data.into())
    }

    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// `true` for text and binary frames.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Deserialize the payload of a text or binary frame.
    ///
    /// # Errors
    /// Fails on malformed JSON and on control frames, which carry no payload
    /// worth decoding.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Text(text) => serde_json::from_str(text),
            Self::Binary(bytes) => serde_json::from_slice(bytes),
            other => Err(serde::de::Error::custom(format!(
                "expected a data frame, got {}",
                other.kind()
            ))),
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Close(_) => "close",
        }
    }
}

impl From<Message> for WsMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Self::Binary(bytes.into()),
            Message::Ping(bytes) => Self::Ping(bytes.into()),
            Message::Pong(bytes) => Self::Pong(bytes.into()),
            Message::Close(frame) => Self::Close(frame.map(WsCloseFrame::from)),
            // Raw frames never surface from a read; treat one as empty data.
            Message::Frame(_) => Self::Binary(Vec::new()),
        }
    }
}

impl From<WsMessage> for Message {
    fn from(message: WsMessage) -> Self {
        match message {
            WsMessage::Text(text) => Self::text(text),
            WsMessage::Binary(bytes) => Self::binary(bytes),
            WsMessage::Ping(bytes) => Self::Ping(bytes.into()),
            WsMessage::Pong(bytes) => Self::Pong(bytes.into()),
            WsMessage::Close(frame) => Self::Close(frame.map(CloseFrame::from)),
        }
    }
}

/// Close code and reason sent by either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: String,
}

impl WsCloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Code 1000.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(1000, "Normal closure")
    }
}

impl From<CloseFrame> for WsCloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self::new(frame.code.into(), frame.reason.as_str())
    }
}

impl From<WsCloseFrame> for CloseFrame {
    fn from(frame: WsCloseFrame) -> Self {
        Self {
            code: CloseCode::from(frame.code),
            reason: frame.reason.into(),
        }
    }
}

/// Handshake options applied by [`WsClient::connect`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Upper bound on TCP connect plus the HTTP upgrade.
    pub connect_timeout: Duration,
    /// Sent as `Sec-WebSocket-Protocol`.
    pub subprotocol: Option<String>,
    /// Extra upgrade request headers, e.g. `Authorization`.
    pub headers: BTreeMap<String, String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            subprotocol: None,
            headers: BTreeMap::new(),
        }
    }
}

impl WsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Later values for the same name replace earlier ones.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn apply(&self, request: &mut Request) -> StreamResult<()> {
        let headers = request.headers_mut();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| StreamError::invalid_header(name, err))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|err| StreamError::invalid_header(name, err))?;
            headers.insert(header_name, header_value);
        }
        if let Some(protocol) = &self.subprotocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|err| StreamError::invalid_header(SEC_WEBSOCKET_PROTOCOL.as_str(), err))?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        Ok(())
    }
}

/// Dials one URL with a fixed [`WsConfig`].
#[derive(Debug, Clone)]
pub struct WsClient {
    url: String,
    config: WsConfig,
}

impl WsClient {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, WsConfig::default())
    }

    #[must_use]
    pub fn with_config(url: impl Into<String>, config: WsConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Open a connection and complete the upgrade handshake.
    ///
    /// # Errors
    /// [`StreamError::ConnectionFailed`] for an unparsable URL,
    /// [`StreamError::InvalidHeader`] for a header that cannot be encoded,
    /// [`StreamError::Timeout`] when the handshake outlives
    /// `connect_timeout`, and [`StreamError::WebSocketError`] otherwise.
    pub async fn connect(&self) -> StreamResult<WsConnection> {
        let url = Url::parse(&self.url)
            .map_err(|err| StreamError::ConnectionFailed(format!("{}: {err}", self.url)))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| StreamError::ConnectionFailed(err.to_string()))?;
        self.config.apply(&mut request)?;

        let (socket, response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(request))
                .await
                .map_err(|_| StreamError::Timeout(self.config.connect_timeout))?
                .map_err(|err| StreamError::WebSocketError(err.to_string()))?;

        let subprotocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        debug!(url = %self.url, ?subprotocol, "websocket handshake complete");

        Ok(WsConnection {
            socket,
            subprotocol,
            closed: false,
        })
    }
}

/// An upgraded socket. Once a close frame, a read error, or end of stream is
/// observed, sends fail and reads return `None`.
pub struct WsConnection {
    socket: Socket,
    subprotocol: Option<String>,
    closed: bool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("subprotocol", &self.subprotocol)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WsConnection {
    /// What the server put in its `Sec-WebSocket-Protocol` response header.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// # Errors
    /// [`StreamError::InvalidState`] after close, or the write failure.
    pub async fn send(&mut self, message: WsMessage) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::InvalidState("send on a closed connection".into()));
        }
        self.socket
            .send(message.into())
            .await
            .map_err(|err| StreamError::WebSocketError(err.to_string()))
    }

    /// Serialize `value` and send it as a text frame.
    ///
    /// # Errors
    /// As [`Self::send`], plus [`StreamError::ParseError`] if `value` does
    /// not serialize.
    pub async fn send_json<T: serde::Serialize + Sync>(&mut self, value: &T) -> StreamResult<()> {
        let text =
            serde_json::to_string(value).map_err(|err| StreamError::ParseError(err.to_string()))?;
        self.send(WsMessage::Text(text)).await
    }

    /// Next frame from the peer. Cancel safe, so it can sit in a `select!`.
    ///
    /// # Errors
    /// The read failure; the connection counts as closed afterwards.
    pub async fn recv(&mut self) -> StreamResult<Option<WsMessage>> {
        if self.closed {
            return Ok(None);
        }
        let Some(read) = self.socket.next().await else {
            self.closed = true;
            return Ok(None);
        };
        let message = read.map(WsMessage::from).map_err(|err| {
            self.closed = true;
            StreamError::WebSocketError(err.to_string())
        })?;
        self.closed = message.is_close();
        Ok(Some(message))
    }

    /// Send a 1000 close frame. Calling it again is a no-op.
    ///
    /// # Errors
    /// The write failure for the close frame.
    pub async fn close(&mut self) -> StreamResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.socket
            .close(Some(WsCloseFrame::normal().into()))
            .await
            .map_err(|err| StreamError::WebSocketError(err.to_string()))
    }
}
