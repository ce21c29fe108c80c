// Messaging module - callbacks, outbound queue and inbound routing
pub mod event;
pub mod queue;
pub mod router;

pub use event::EventHandlers;
pub use queue::{OutboundQueue, OverflowPolicy};
pub use router::MessageRouter;
