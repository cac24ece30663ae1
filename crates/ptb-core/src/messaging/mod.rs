//! Messenger-facing abstractions (Telegram is the only implementation today).

pub mod port;
pub mod throttled;
pub mod types;
