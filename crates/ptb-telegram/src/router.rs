use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use ptb_core::tracker::Tracker;

use crate::handlers;

/// Long-poll Telegram until ctrl-c.
///
/// The dispatcher's default distribution keeps updates from one chat
/// sequential while different chats run concurrently.
pub async fn run_polling(bot: Bot, tracker: Arc<Tracker>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "ptb started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; polling anyway"),
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tracker])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
