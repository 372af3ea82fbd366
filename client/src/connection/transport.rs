//! Socket transport
//!
//! The connection manager talks to the network through [`Connector`] and
//! [`Socket`] so it can be driven by an in-memory transport in tests.
//! [`WsConnector`] is the production implementation on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Socket could not be opened
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Frame could not be written
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Socket read failed
    #[error("failed to receive frame: {0}")]
    Receive(String),

    /// Socket is already closed
    #[error("socket closed")]
    Closed,
}

/// Opens sockets to the backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError>;
}

/// An open text-frame socket
#[async_trait]
pub trait Socket: Send {
    /// Write one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame; `None` once the peer closed the socket
    ///
    /// Must be cancel safe: dropping the future loses no frame.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the socket from this side
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Peer closed the socket");
                    return None;
                }
                // Pings are answered by tungstenite on the next write
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
