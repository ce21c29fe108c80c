// Transport module - the persistent socket seam and its WebSocket implementation
pub mod factory;
pub mod transport;

pub use factory::WebSocketFactory;
pub use transport::{FrameSink, FrameStream, Transport, TransportConnection};
