use crate::types::Result;
use async_trait::async_trait;
use url::Url;

/// Opens persistent bidirectional connections.
///
/// The client only depends on this contract, so tests and alternative
/// transports can be plugged in through
/// [`RealtimeClientBuilder::with_transport`](crate::client::RealtimeClientBuilder::with_transport).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `url` and returns its write and read halves.
    async fn open(&self, url: &Url) -> Result<TransportConnection>;
}

/// Write half of an open connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one text frame.
    async fn send_frame(&mut self, frame: String) -> Result<()>;

    /// Closes the connection gracefully.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Both halves of a freshly opened connection.
pub struct TransportConnection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl TransportConnection {
    pub fn new(sink: impl FrameSink + 'static, stream: impl FrameStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}
