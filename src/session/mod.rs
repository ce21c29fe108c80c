// Session module - presence and typing state owned by a single worker
pub mod presence;
pub mod typing;
pub mod worker;

pub use presence::{PresenceChange, PresenceEntry, PresenceStatus, PresenceTracker};
pub use typing::{TypingChange, TypingEvent, TypingTracker};
pub use worker::{SessionConfig, SessionHandle};
