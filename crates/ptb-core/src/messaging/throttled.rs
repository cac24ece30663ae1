use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

/// Idle per-chat limiters are dropped once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two Bot API calls (~30/sec bot-wide limit).
    pub global_min_interval: Duration,
    /// Spacing between sends into the same chat (~1/sec chat limit).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Hands out evenly spaced time slots.
#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self, now: Instant) -> Duration {
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }

    fn idle(&self, now: Instant) -> bool {
        self.next <= now
    }
}

/// MessagingPort decorator that spaces outbound calls.
///
/// A scan cycle can fan one status change out to many chats at once; spacing the
/// sends keeps us under Telegram's flood limits.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatId, IntervalLimiter>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for a global slot and, when a chat is known, for that chat's slot.
    async fn pace(&self, chat_id: Option<ChatId>) {
        let now = Instant::now();
        let mut wait = self.global.lock().await.reserve(now);

        if let Some(chat_id) = chat_id {
            let mut per_chat = self.per_chat.lock().await;
            if per_chat.len() > PRUNE_THRESHOLD {
                per_chat.retain(|_, limiter| !limiter.idle(now));
            }
            let limiter = per_chat
                .entry(chat_id)
                .or_insert_with(|| IntervalLimiter::new(self.cfg.per_chat_min_interval));
            wait = wait.max(limiter.reserve(now));
        }

        if !wait.is_zero() {
            tracing::trace!(?chat_id, wait_ms = wait.as_millis() as u64, "throttling send");
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner
            .send_inline_keyboard(chat_id, html, keyboard)
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.pace(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
