//! Chat command parsing and handlers.
//!
//! Each inbound message is handled on its own: parse → run one handler against
//! the store → produce one reply. There is no conversation state.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::{
    domain::{Chat, WatchEntry},
    formatting::{escape_html, pack_html_blocks, truncate_label, MAX_MESSAGE_LEN},
    messaging::types::{InlineButton, InlineKeyboard, Reply},
    store::TrackStore,
    Error, Result,
};

pub const ADDED_REPLY: &str = "Added track to this chat list";
pub const REMOVED_REPLY: &str = "Removed track number from watch list";
pub const INVALID_TRACK_NUMBER: &str = "Invalid track number";
pub const NOTHING_WATCHED: &str =
    "Nothing is watched in this chat yet. Use /add <track> <comment> to start.";

pub const MAX_COMMENT_CHARS: usize = 256;

/// Callback data prefix of the quick-delete buttons under `/list`.
pub const DELETE_CALLBACK_PREFIX: &str = "delete:";

/// Telegram's cap on buttons in one inline keyboard.
pub const MAX_KEYBOARD_BUTTONS: usize = 100;

const HELP_MESSAGE: &str = "<b>/help</b> - print this help message\n\
<b>/list</b> - list tracknumbers watched in this chat\n\
<b>/add</b> <i>track</i> <i>comment</i> - add tracknumber to watchlist\n\
<b>/delete</b> <i>track</i> - delete tracknumber from watchlist";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Add,
    Delete,
    List,
    Help,
    /// Anything else; ignored without a reply.
    Unknown,
}

impl Command {
    pub fn from_token(token: &str) -> Self {
        match token {
            "add" => Self::Add,
            "delete" => Self::Delete,
            "list" => Self::List,
            "help" | "start" => Self::Help,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub token: String,
    pub command: Command,
    pub args: Vec<String>,
}

/// Parse `/cmd[_arg...][@bot] arg ...`.
///
/// Underscores in the command word act as spaces, so `/add_123 gift` equals
/// `/add 123 gift`. Only the command token is lower-cased. Returns `None` for
/// text that is not a command at all.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let body = text.trim().strip_prefix('/')?;

    let mut words = body.split_whitespace();
    let head = words.next()?;
    let head = head.split('@').next().unwrap_or("");

    let mut head_parts = head.split('_').filter(|p| !p.is_empty());
    let token = head_parts.next()?.to_lowercase();

    let args = head_parts
        .map(str::to_string)
        .chain(words.map(str::to_string))
        .collect();

    Some(ParsedCommand {
        command: Command::from_token(&token),
        token,
        args,
    })
}

fn track_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{1,40}$").expect("valid track number regex"))
}

pub fn validate_track_number(number: &str) -> Result<()> {
    if track_number_re().is_match(number) {
        Ok(())
    } else {
        Err(Error::Validation(format!("malformed track number: {number:?}")))
    }
}

pub struct CommandDispatcher {
    store: Arc<dyn TrackStore>,
    button_label_max_length: usize,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn TrackStore>, button_label_max_length: usize) -> Self {
        Self {
            store,
            button_label_max_length: button_label_max_length.max(8),
        }
    }

    /// Handle one message from `chat`. `None` means "stay silent".
    ///
    /// Handler errors never escape: a user-facing message is shown as-is,
    /// anything else becomes the generic invalid-number reply.
    pub async fn dispatch(&self, chat: &Chat, text: &str) -> Option<Reply> {
        let parsed = parse_command(text)?;

        if parsed.command == Command::Unknown {
            tracing::debug!(chat_id = %chat.chat_id, token = %parsed.token, "ignoring unknown command");
            return None;
        }

        tracing::info!(chat_id = %chat.chat_id, command = %parsed.token, "command");
        tracing::debug!(chat_id = %chat.chat_id, text, "full command");

        let res = match parsed.command {
            Command::Add => self.add(chat, &parsed.args).await,
            Command::Delete => self.delete(chat, &parsed.args).await,
            Command::List => self.list(chat).await,
            Command::Help => Ok(Reply::Html(HELP_MESSAGE.to_string())),
            Command::Unknown => return None,
        };

        Some(res.unwrap_or_else(|err| {
            tracing::warn!(chat_id = %chat.chat_id, command = %parsed.token, error = %err, "command failed");
            Reply::text(err.user_message().unwrap_or(INVALID_TRACK_NUMBER))
        }))
    }

    async fn add(&self, chat: &Chat, args: &[String]) -> Result<Reply> {
        let (number, rest) = args
            .split_first()
            .ok_or_else(|| Error::Validation("missing track number".to_string()))?;
        validate_track_number(number)?;

        let comment = rest.join(" ");
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(Error::user_facing(format!(
                "Comment is too long, keep it under {MAX_COMMENT_CHARS} characters"
            )));
        }

        let track = self.store.find_or_create_track(number).await?;
        self.store.add_watch(&track, chat, &comment).await?;
        Ok(Reply::text(ADDED_REPLY))
    }

    async fn delete(&self, chat: &Chat, args: &[String]) -> Result<Reply> {
        let number = args
            .first()
            .ok_or_else(|| Error::Validation("missing track number".to_string()))?;

        let track = self
            .store
            .find_track(number)
            .await?
            .ok_or_else(|| Error::Validation(format!("unknown track {number:?}")))?;

        self.store.remove_watch(&track, chat).await?;
        Ok(Reply::text(REMOVED_REPLY))
    }

    async fn list(&self, chat: &Chat) -> Result<Reply> {
        let watches = self.store.list_watches(chat).await?;
        if watches.is_empty() {
            return Ok(Reply::text(NOTHING_WATCHED));
        }

        Ok(Reply::Keyboard {
            pages: render_watch_list(&watches),
            keyboard: delete_keyboard(&watches, self.button_label_max_length),
        })
    }
}

/// Render the list as pages that each fit into one message. Every watch is
/// one block, so a page break never falls inside an entry.
fn render_watch_list(watches: &[WatchEntry]) -> Vec<String> {
    let mut blocks = vec![format!("<b>Watched tracks ({})</b>", watches.len())];

    for w in watches {
        let mut lines = Vec::with_capacity(3);
        let mut head = format!("📦 <b>{}</b>", escape_html(&w.track.number));
        if !w.comment.is_empty() {
            head.push_str(&format!(" <i>{}</i>", escape_html(&w.comment)));
        }
        lines.push(head);

        match w.track.status.as_deref() {
            Some(status) => {
                lines.push(escape_html(status));
                lines.push(format!(
                    "<code>updated {}</code>",
                    w.track.updated_at.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            None => lines.push("<i>no status yet</i>".to_string()),
        }
        blocks.push(lines.join("\n"));
    }

    if watches.len() > MAX_KEYBOARD_BUTTONS {
        blocks.push(format!(
            "<i>Delete buttons are shown for the first {MAX_KEYBOARD_BUTTONS} tracks, use /delete for the rest.</i>"
        ));
    }

    pack_html_blocks(&blocks, "\n\n", MAX_MESSAGE_LEN)
}

fn delete_keyboard(watches: &[WatchEntry], max_label_len: usize) -> InlineKeyboard {
    let buttons = watches
        .iter()
        .take(MAX_KEYBOARD_BUTTONS)
        .map(|w| {
            let label = if w.comment.is_empty() {
                w.track.number.clone()
            } else {
                format!("{} {}", w.track.number, w.comment)
            };
            InlineButton {
                label: format!("❌ {}", truncate_label(&label, max_label_len)),
                callback_data: format!("{DELETE_CALLBACK_PREFIX}{}", w.track.number),
            }
        })
        .collect();
    InlineKeyboard::new(buttons)
}
