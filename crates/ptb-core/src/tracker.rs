//! Engine facade: the two entry points the outside world calls.
//!
//! - `update` for every inbound chat update (one at a time per chat)
//! - `scan` from an external scheduler

use std::sync::Arc;

use crate::{
    carrier::CarrierClient,
    commands::CommandDispatcher,
    config::Config,
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, IncomingUpdate, TextMessage},
    },
    notifier::Notifier,
    retention::RetentionSweeper,
    scan::{ScanLoop, ScanReport},
    store::TrackStore,
};

pub struct Tracker {
    store: Arc<dyn TrackStore>,
    messenger: Arc<dyn MessagingPort>,
    dispatcher: CommandDispatcher,
    notifier: Notifier,
    scan: ScanLoop,
}

impl Tracker {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn TrackStore>,
        carrier: Arc<dyn CarrierClient>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let sweeper = RetentionSweeper::new(store.clone(), notifier.clone(), cfg.retention);
        let scan = ScanLoop::new(
            store.clone(),
            carrier,
            notifier.clone(),
            sweeper,
            cfg.carrier_timeout,
        );
        let dispatcher = CommandDispatcher::new(store.clone(), cfg.button_label_max_length);

        Self {
            store,
            messenger,
            dispatcher,
            notifier,
            scan,
        }
    }

    /// Handle one inbound update. Failures are logged, never returned.
    pub async fn update(&self, update: IncomingUpdate) {
        match update {
            IncomingUpdate::Message(msg) => self.update_message(msg).await,
            IncomingUpdate::Callback(cq) => self.update_callback(cq).await,
        }
    }

    /// Refresh all watched tracks, then prune stale ones.
    pub async fn scan(&self) -> ScanReport {
        self.scan.run().await
    }

    async fn update_message(&self, msg: TextMessage) {
        let chat = match self.store.find_or_create_chat(msg.chat_id).await {
            Ok(chat) => chat,
            Err(e) => {
                tracing::error!(chat_id = %msg.chat_id, error = %e, "failed to resolve chat");
                return;
            }
        };

        // A chat writing to us is reachable again (e.g. the user unblocked the bot).
        if !chat.enabled {
            tracing::info!(chat_id = %chat.chat_id, "re-enabling chat");
            if let Err(e) = self.store.set_chat_enabled(chat.chat_id, true).await {
                tracing::warn!(chat_id = %chat.chat_id, error = %e, "failed to re-enable chat");
            }
        }

        let Some(reply) = self.dispatcher.dispatch(&chat, &msg.text).await else {
            return;
        };

        if let Err(e) = self.notifier.send(chat.chat_id, &reply).await {
            tracing::warn!(chat_id = %chat.chat_id, error = %e, "failed to send reply");
        }
    }

    async fn update_callback(&self, cq: CallbackQuery) {
        // Buttons are rendered by /list but not acted upon yet.
        tracing::debug!(chat_id = %cq.chat_id, data = %cq.data, "callback query");
        if let Err(e) = self
            .messenger
            .answer_callback_query(&cq.callback_id, None)
            .await
        {
            tracing::debug!(error = %e, "failed to answer callback query");
        }
    }
}
