use crate::domain::ChatId;

/// Core error type for the tracker.
///
/// Adapter crates map their specific errors into this type so the engine can
/// decide consistently between a user-facing reply, a skipped refresh and a
/// disabled chat.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("chat {chat_id} does not watch track {number}")]
    NotWatched { chat_id: ChatId, number: String },

    /// Error whose message is safe to show in the chat as-is.
    #[error("{user_message}")]
    UserFacing { user_message: String },

    #[error("carrier error: {0}")]
    Carrier(String),

    #[error("delivery to chat {chat_id} failed: {reason}")]
    Delivery {
        chat_id: ChatId,
        reason: String,
        /// The chat can no longer be reached (bot blocked, chat deleted, ...).
        permanent: bool,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn user_facing(msg: impl Into<String>) -> Self {
        Self::UserFacing {
            user_message: msg.into(),
        }
    }

    /// Message to show verbatim in the chat, if this error carries one.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::UserFacing { user_message } => Some(user_message),
            _ => None,
        }
    }

    pub fn is_permanent_delivery_failure(&self) -> bool {
        matches!(
            self,
            Self::Delivery {
                permanent: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
