use crate::domain::ChatId;

/// Inbound update, already stripped of gateway-specific fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingUpdate {
    Message(TextMessage),
    Callback(CallbackQuery),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub callback_id: String,
    pub data: String,
}

/// Inline keyboard (buttons) attached to an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

/// Outgoing reply produced by a command handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Html(String),
    /// Messages sent in order, with the keyboard under the last one.
    Keyboard {
        pages: Vec<String>,
        keyboard: InlineKeyboard,
    },
}

impl Reply {
    /// Plain text, escaped for HTML parse mode.
    pub fn text(text: &str) -> Self {
        Self::Html(crate::formatting::escape_html(text))
    }
}
