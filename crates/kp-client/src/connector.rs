//! The socket seam: a [`Connector`] dials an endpoint and yields a [`Link`]
//! that moves JSON text frames.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tracing::trace;

use crate::{Error, Result};

/// One live connection carrying text frames.
#[async_trait]
pub trait Link: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens [`Link`]s to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dial `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>> {
        let (stream, _resp) = connect_async(url)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(Box::new(WsLink { stream }))
    }
}

/// A WebSocket connection.
struct WsLink {
    /// Underlying stream.
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Socket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => trace!("ws_drop_binary"),
                },
                Ok(Message::Close(frame)) => {
                    trace!(?frame, "ws_close_frame");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(Error::Socket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            trace!(error = %e, "ws_close_failed");
        }
    }
}
