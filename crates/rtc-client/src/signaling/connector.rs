//! Link factories for the signaling channel
//!
//! A [`SignalingConnector`] opens one duplex text link to the relay. The
//! channel owns correlation, events and reconnection; the connector only moves
//! frames, which keeps the channel testable against an in-memory relay.

use crate::auth::Credentials;
use crate::error::ConnectionError;
use crate::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Why a link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Relay- or transport-supplied description
    pub message: String,
    /// false only for an orderly close initiated by the relay
    pub abnormal: bool,
}

impl CloseReason {
    /// Abnormal loss (network error, dropped socket)
    pub fn abnormal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            abnormal: true,
        }
    }

    /// Orderly close
    pub fn normal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            abnormal: false,
        }
    }
}

/// Something arriving from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame
    Frame(String),
    /// The link is gone; no further events follow
    Closed(CloseReason),
}

/// One open duplex link
///
/// Dropping `outbound` closes the link from our side.
#[derive(Debug)]
pub struct SignalingLink {
    /// Frames to the relay
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames and the final close from the relay
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens links to the relay
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Open a link authenticated with `credentials`
    ///
    /// Authentication rejections must surface as [`ConnectionError::Auth`] so
    /// the channel can refresh the credential instead of backing off.
    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<SignalingLink>;
}

/// WebSocket connector (JSON-RPC text frames)
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a WebSocket connector
    pub fn new() -> Self {
        Self
    }

    /// Sender task: sends frames from channel to WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(text) = rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                error!("Failed to send WebSocket message: {}", e);
                return;
            }
        }

        // Outbound side dropped: orderly local close.
        let _ = write.send(Message::Close(None)).await;
        debug!("Sender task terminated");
    }

    /// Receiver task: forwards WebSocket frames as link events
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        tx: mpsc::UnboundedSender<LinkEvent>,
    ) {
        let reason = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    if tx.send(LinkEvent::Frame(text)).is_err() {
                        debug!("Link receiver dropped, stopping");
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("WebSocket connection closed by relay: {:?}", frame);
                    break match frame {
                        Some(frame) if frame.code == CloseCode::Normal => {
                            CloseReason::normal(frame.reason.to_string())
                        }
                        Some(frame) => {
                            CloseReason::abnormal(format!("{}: {}", frame.code, frame.reason))
                        }
                        None => CloseReason::abnormal("closed without reason"),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break CloseReason::abnormal(e.to_string());
                }
                None => break CloseReason::abnormal("transport close"),
            }
        };

        let _ = tx.send(LinkEvent::Closed(reason));
        debug!("Receiver task terminated");
    }
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, url: &str, credentials: &Credentials) -> Result<SignalingLink> {
        info!("Connecting to signaling server: {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectionError::Transient(format!("Invalid signaling URL: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))
            .map_err(|_| ConnectionError::Auth("access token is not a valid header".to_string()))?;
        request.headers_mut().insert("Authorization", bearer);

        let (ws_stream, _) = connect_async(request).await?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, out_rx));
        tokio::spawn(Self::receiver_task(read, in_tx));

        Ok(SignalingLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

impl From<tungstenite::Error> for crate::Error {
    fn from(err: tungstenite::Error) -> Self {
        classify_ws_error(err)
    }
}

/// Rejected handshakes are auth failures; the rest go by their message
fn classify_ws_error(err: tungstenite::Error) -> crate::Error {
    match err {
        tungstenite::Error::Http(response)
            if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
        {
            ConnectionError::Auth(format!("relay rejected credential ({})", response.status()))
                .into()
        }
        other => ConnectionError::from_message(format!("Failed to connect: {}", other)).into(),
    }
}
