use std::fmt;

use chrono::{DateTime, Utc};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A chat that talked to the bot at least once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: ChatId,
    /// Whether notifications may be delivered to this chat.
    pub enabled: bool,
}

/// A carrier-assigned parcel number with its last known status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub number: String,
    /// `None` until the first successful carrier refresh.
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a chat's watch list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEntry {
    pub track: Track,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A chat subscribed to a track, with the comment it gave at `add` time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watcher {
    pub chat: Chat,
    pub comment: String,
}

/// Current state of a parcel as reported by the carrier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub text: String,
}

impl StatusSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
