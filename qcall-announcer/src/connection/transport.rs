//! Push-channel transport seam and its WebSocket implementation

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// An open push connection
#[async_trait]
pub trait PushChannel: Send {
    /// Next text message. `None` once the peer has closed the channel.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the channel. Nothing is read after this is called.
    async fn close(self: Box<Self>);
}

/// Opens push connections
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushChannel>>;
}

/// WebSocket connector (ws:// or wss://)
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>> {
        let connecting = tokio_tungstenite::connect_async(self.url.as_str());
        let (stream, response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "Connecting to {} timed out after {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::Connection(format!("Connecting to {} failed: {}", self.url, e)))?;

        debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "Push channel closed by server");
                    return None;
                }
                Ok(WsMessage::Binary(data)) => {
                    debug!(bytes = data.len(), "Ignoring binary push frame");
                }
                // Ping/pong are answered by tungstenite
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                Err(e) => return Some(Err(Error::Connection(e.to_string()))),
            }
        }
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Error closing push channel");
        }
    }
}
