#![allow(dead_code)]

use async_trait::async_trait;
use chat_realtime_rs::{
    FrameSink, FrameStream, Message, MessageType, RealtimeClient, RealtimeClientOptions,
    RealtimeError, Result, Transport, TransportConnection,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

pub const ENDPOINT: &str = "ws://chat.test/ws";

#[derive(Default)]
struct ServerState {
    refuse: bool,
    opens: Vec<Instant>,
    urls: Vec<String>,
    received: Vec<String>,
    connections: Vec<mpsc::UnboundedSender<Result<String>>>,
}

/// In-memory stand-in for the chat server.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
    // While true, client writes hang like on a half-open socket
    stalled: Arc<watch::Sender<bool>>,
}

impl MockServer {
    pub fn new() -> Self {
        let (stalled, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            stalled: Arc::new(stalled),
        }
    }

    /// Makes client writes hang until called again with `false`.
    pub fn stall_sends(&self, stalled: bool) {
        self.stalled.send_replace(stalled);
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
        }
    }

    pub fn client(&self, options: RealtimeClientOptions) -> RealtimeClient {
        RealtimeClient::builder(ENDPOINT, options)
            .unwrap()
            .with_transport(self.transport())
            .build()
    }

    /// Makes every following connection attempt fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    /// Pushes a frame to the most recent connection.
    pub fn push(&self, frame: &str) {
        let state = self.state.lock().unwrap();
        if let Some(connection) = state.connections.last() {
            let _ = connection.send(Ok(frame.to_string()));
        }
    }

    pub fn push_message(&self, message: &Message) {
        self.push(&message.to_frame().unwrap());
    }

    /// Closes every open connection from the server side.
    pub fn close_all(&self) {
        self.state.lock().unwrap().connections.clear();
    }

    /// Messages the client wrote, in wire order
    pub fn received(&self) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .map(|frame| Message::from_frame(frame).unwrap())
            .collect()
    }

    pub fn received_texts(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|message| message.kind() == MessageType::Data)
            .map(|message| message.payload()["text"].as_str().unwrap().to_string())
            .collect()
    }
}

pub struct MockTransport {
    server: MockServer,
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<TransportConnection> {
        let mut state = self.server.state.lock().unwrap();
        state.opens.push(Instant::now());
        state.urls.push(url.to_string());
        if state.refuse {
            return Err(RealtimeError::Connection("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.connections.push(tx);
        Ok(TransportConnection::new(
            MockSink {
                server: self.server.clone(),
            },
            MockStream { rx },
        ))
    }
}

struct MockSink {
    server: MockServer,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, frame: String) -> Result<()> {
        let mut stalled = self.server.stalled.subscribe();
        loop {
            if !*stalled.borrow_and_update() {
                break;
            }
            if stalled.changed().await.is_err() {
                break;
            }
        }
        self.server.state.lock().unwrap().received.push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

/// Lets background tasks run until they are all idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
