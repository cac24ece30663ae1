//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into an `IncomingUpdate` and hands
//! it to the tracker. Replies go out through the messaging port, never
//! through the `Bot` passed in here.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use ptb_core::{
    domain::ChatId,
    messaging::types::{self, IncomingUpdate, TextMessage},
    tracker::Tracker,
};

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    tracker: Arc<Tracker>,
) -> ResponseResult<()> {
    match callback_update(&q) {
        Some(update) => tracker.update(update).await,
        None => {
            // Nothing to route (e.g. inline-mode callback); still stop the spinner.
            if let Err(e) = bot.answer_callback_query(q.id).await {
                tracing::debug!(error = %e, "failed to answer callback query");
            }
        }
    }
    Ok(())
}

pub async fn handle_message(msg: Message, tracker: Arc<Tracker>) -> ResponseResult<()> {
    if let Some(update) = message_update(&msg) {
        tracker.update(update).await;
    }
    Ok(())
}

fn message_update(msg: &Message) -> Option<IncomingUpdate> {
    let text = msg.text()?;
    Some(IncomingUpdate::Message(TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        text: text.to_string(),
    }))
}

fn callback_update(q: &CallbackQuery) -> Option<IncomingUpdate> {
    let chat_id = q.message.as_ref().map(|m| m.chat.id.0)?;
    Some(IncomingUpdate::Callback(types::CallbackQuery {
        chat_id: ChatId(chat_id),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
    }))
}
