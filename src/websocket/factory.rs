use super::transport::{FrameSink, FrameStream, Transport, TransportConnection};
use crate::types::Result;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket factory for creating WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

#[async_trait]
impl Transport for WebSocketFactory {
    async fn open(&self, url: &Url) -> Result<TransportConnection> {
        tracing::debug!("Creating WebSocket connection to: {}", redact(url));
        let (ws_stream, response) = connect_async(url.as_str()).await?;
        tracing::debug!("WebSocket handshake completed: {}", response.status());

        let (write_half, read_half) = ws_stream.split();
        Ok(TransportConnection::new(
            WebSocketSink { inner: write_half },
            WebSocketReader { inner: read_half },
        ))
    }
}

pub struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.inner.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

pub struct WebSocketReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WebSocketReader {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            let msg = match self.inner.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Close(frame) => {
                    if let Some(close_frame) = frame {
                        tracing::warn!(
                            "Server closed connection: code={:?}, reason='{}'",
                            close_frame.code,
                            close_frame.reason
                        );
                    } else {
                        tracing::warn!("Server closed connection without close frame");
                    }
                    return None;
                }
                Message::Ping(data) => {
                    tracing::debug!("Received ping ({} bytes)", data.len());
                }
                Message::Pong(data) => {
                    tracing::debug!("Received pong ({} bytes)", data.len());
                }
                Message::Binary(data) => {
                    tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
                }
                Message::Frame(_) => {
                    tracing::debug!("Received raw frame (internal)");
                }
            }
        }
    }
}

/// Endpoint without its query string, safe to log.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
