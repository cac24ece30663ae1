//! Delivery boundary between the engine and the messaging gateway.

use std::sync::Arc;

use crate::{
    domain::{Chat, ChatId},
    formatting::{split_html_chunks, MAX_MESSAGE_LEN},
    messaging::{port::MessagingPort, types::Reply},
    store::TrackStore,
    Result,
};

/// Sends replies and notices, and disables chats that can no longer be reached.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn TrackStore>,
    messenger: Arc<dyn MessagingPort>,
}

impl Notifier {
    pub fn new(store: Arc<dyn TrackStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { store, messenger }
    }

    /// Send `reply` to `chat_id`, split into messages Telegram accepts. A
    /// permanent delivery failure disables the chat before the error is returned.
    pub async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        let res = self.deliver(chat_id, reply).await;

        if let Err(err) = &res {
            if err.is_permanent_delivery_failure() {
                tracing::warn!(chat_id = %chat_id, error = %err, "disabling unreachable chat");
                if let Err(e) = self.store.set_chat_enabled(chat_id, false).await {
                    tracing::error!(chat_id = %chat_id, error = %e, "failed to disable chat");
                }
            }
        }
        res
    }

    async fn deliver(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        match reply {
            Reply::Html(html) => {
                for chunk in split_html_chunks(html, MAX_MESSAGE_LEN) {
                    self.messenger.send_html(chat_id, &chunk).await?;
                }
            }
            Reply::Keyboard { pages, keyboard } => {
                let Some((last, head)) = pages.split_last() else {
                    return Ok(());
                };
                for page in head {
                    self.messenger.send_html(chat_id, page).await?;
                }
                self.messenger
                    .send_inline_keyboard(chat_id, last, keyboard.clone())
                    .await?;
            }
        }
        Ok(())
    }

    /// Best-effort notice to a watcher. Disabled chats are skipped.
    ///
    /// Returns whether the notice was delivered.
    pub async fn notify(&self, chat: &Chat, html: &str) -> bool {
        if !chat.enabled {
            tracing::debug!(chat_id = %chat.chat_id, "skipping notice to disabled chat");
            return false;
        }
        match self.send(chat.chat_id, &Reply::Html(html.to_string())).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(chat_id = %chat.chat_id, error = %err, "notice not delivered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::{InlineButton, InlineKeyboard};
    use crate::testing::{temp_store, FakeMessenger};

    #[tokio::test]
    async fn permanent_failure_disables_chat() {
        let store = Arc::new(temp_store().await);
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let chat = store.find_or_create_chat(ChatId(9)).await.unwrap();
        messenger.block(ChatId(9));

        assert!(!notifier.notify(&chat, "hello").await);

        assert!(!store.find_or_create_chat(ChatId(9)).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn disabled_chat_is_skipped() {
        let store = Arc::new(temp_store().await);
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let chat = Chat {
            chat_id: ChatId(4),
            enabled: false,
        };

        assert!(!notifier.notify(&chat, "hello").await);
        assert!(messenger.all_sent().is_empty());
    }

    #[tokio::test]
    async fn long_notice_is_split_into_several_messages() {
        let store = Arc::new(temp_store().await);
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let chat = store.find_or_create_chat(ChatId(4)).await.unwrap();
        let status = "Sorting center, line ".repeat(400);

        assert!(notifier.notify(&chat, &status).await);

        let sent = messenger.sent_to(ChatId(4));
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|m| m.len() <= MAX_MESSAGE_LEN));
        assert_eq!(sent.concat(), status);
    }

    #[tokio::test]
    async fn keyboard_goes_under_the_last_page() {
        let store = Arc::new(temp_store().await);
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let keyboard = InlineKeyboard::new(vec![InlineButton {
            label: "❌ 1".to_string(),
            callback_data: "delete:1".to_string(),
        }]);
        let reply = Reply::Keyboard {
            pages: vec!["one".to_string(), "two".to_string(), "three".to_string()],
            keyboard: keyboard.clone(),
        };

        notifier.send(ChatId(4), &reply).await.unwrap();

        assert_eq!(messenger.sent_to(ChatId(4)), vec!["one", "two"]);
        assert_eq!(
            messenger.keyboard_sends(),
            vec![(ChatId(4), "three".to_string(), keyboard)]
        );
    }

    #[tokio::test]
    async fn delivers_to_enabled_chat() {
        let store = Arc::new(temp_store().await);
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Notifier::new(store.clone(), messenger.clone());
        let chat = store.find_or_create_chat(ChatId(4)).await.unwrap();

        assert!(notifier.notify(&chat, "<b>x</b>").await);
        assert_eq!(messenger.sent_to(ChatId(4)), vec!["<b>x</b>".to_string()]);
    }
}
