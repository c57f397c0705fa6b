//! WebSocket Connector
//!
//! Opens one `tokio-tungstenite` connection per symbol at
//! `{base_url}/{symbol}@trade` and adapts it to the `FeedSession` port.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnector, FeedError, FeedFrame, FeedSession};
use crate::domain::tick::Symbol;

/// Default trade-stream endpoint.
pub const DEFAULT_BASE_URL: &str = "wss://fstream.binance.com/ws";

/// Default bound on opening a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the per-symbol trade stream.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl WebSocketConnector {
    /// Create a connector for `base_url` (no trailing slash needed).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Stream URL for a symbol.
    #[must_use]
    pub fn stream_url(&self, symbol: &Symbol) -> String {
        format!("{}/{}@trade", self.base_url, symbol)
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self, symbol: &Symbol) -> Result<Box<dyn FeedSession>, FeedError> {
        let url = self.stream_url(symbol);
        tracing::debug!(symbol = %symbol, url = %url, "Opening trade stream");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| FeedError::ConnectTimeout {
                secs: self.connect_timeout.as_secs(),
            })?
            .map_err(|e| FeedError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Ok(Box::new(WebSocketSession { stream }))
    }
}

/// An open trade-stream WebSocket.
struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedSession for WebSocketSession {
    async fn recv(&mut self) -> Option<Result<FeedFrame, FeedError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => FeedFrame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => FeedFrame::Text(text),
                    Err(_) => continue,
                },
                Ok(Message::Ping(data)) => FeedFrame::Ping(data.to_vec()),
                Ok(Message::Pong(_)) => FeedFrame::Pong,
                Ok(Message::Close(_)) => FeedFrame::Close,
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(FeedError::WebSocket(e.to_string()))),
            };
            return Some(Ok(frame));
        }
    }

    async fn ping(&mut self, payload: Vec<u8>) -> Result<(), FeedError> {
        self.stream
            .send(Message::Ping(payload.into()))
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))
    }

    async fn pong(&mut self, payload: Vec<u8>) -> Result<(), FeedError> {
        self.stream
            .send(Message::Pong(payload.into()))
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error closing trade stream");
        }
    }
}
