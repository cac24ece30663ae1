//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    carrier::CarrierClient,
    domain::{Chat, ChatId, MessageId, MessageRef, StatusSnapshot, Track, WatchEntry, Watcher},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    store::{SqliteTrackStore, TrackStore},
    Error, Result,
};

/// Fresh migrated store in a temporary directory.
pub async fn temp_store() -> SqliteTrackStore {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    // Keep the directory alive for the rest of the test process.
    std::mem::forget(dir);
    SqliteTrackStore::connect(&url).await.unwrap()
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    callbacks: Mutex<Vec<String>>,
    blocked: Mutex<HashSet<i64>>,
}

impl FakeMessenger {
    /// Make every send to `chat_id` fail as if the user blocked the bot.
    pub fn block(&self, chat_id: ChatId) {
        self.blocked.lock().unwrap().insert(chat_id.0);
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, html)| html.clone())
            .collect()
    }

    pub fn all_sent(&self) -> Vec<(ChatId, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn keyboard_sends(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }

    pub fn answered_callbacks(&self) -> Vec<String> {
        self.callbacks.lock().unwrap().clone()
    }

    fn check_blocked(&self, chat_id: ChatId) -> Result<()> {
        if self.blocked.lock().unwrap().contains(&chat_id.0) {
            return Err(Error::Delivery {
                chat_id,
                reason: "Forbidden: bot was blocked by the user".to_string(),
                permanent: true,
            });
        }
        Ok(())
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.check_blocked(chat_id)?;
        self.sends
            .lock()
            .unwrap()
            .push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.check_blocked(chat_id)?;
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, html.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        self.callbacks.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Scripted {
    Status(String),
    Fail,
    Hang,
}

/// Carrier answering from a per-number script; unknown numbers fail.
#[derive(Default)]
pub struct FakeCarrier {
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCarrier {
    pub fn set_status(&self, number: &str, status: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(number.to_string(), Scripted::Status(status.to_string()));
    }

    pub fn set_failing(&self, number: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(number.to_string(), Scripted::Fail);
    }

    /// Never answer for `number` (exercises the per-call timeout).
    pub fn set_hanging(&self, number: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(number.to_string(), Scripted::Hang);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CarrierClient for FakeCarrier {
    async fn fetch_status(&self, number: &str) -> Result<StatusSnapshot> {
        self.calls.lock().unwrap().push(number.to_string());
        let scripted = self.script.lock().unwrap().get(number).cloned();
        match scripted {
            Some(Scripted::Status(text)) => Ok(StatusSnapshot::new(text)),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Carrier("woke up".to_string()))
            }
            Some(Scripted::Fail) | None => {
                Err(Error::Carrier(format!("no data for {number}")))
            }
        }
    }
}

/// Real store whose `delete_track` fails for one number.
pub struct FailingDeleteStore {
    inner: Arc<SqliteTrackStore>,
    fail_on: String,
}

impl FailingDeleteStore {
    pub fn new(inner: Arc<SqliteTrackStore>, fail_on: &str) -> Self {
        Self {
            inner,
            fail_on: fail_on.to_string(),
        }
    }
}

#[async_trait]
impl TrackStore for FailingDeleteStore {
    async fn find_or_create_chat(&self, chat_id: ChatId) -> Result<Chat> {
        self.inner.find_or_create_chat(chat_id).await
    }

    async fn set_chat_enabled(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        self.inner.set_chat_enabled(chat_id, enabled).await
    }

    async fn find_or_create_track(&self, number: &str) -> Result<Track> {
        self.inner.find_or_create_track(number).await
    }

    async fn find_track(&self, number: &str) -> Result<Option<Track>> {
        self.inner.find_track(number).await
    }

    async fn add_watch(&self, track: &Track, chat: &Chat, comment: &str) -> Result<()> {
        self.inner.add_watch(track, chat, comment).await
    }

    async fn remove_watch(&self, track: &Track, chat: &Chat) -> Result<()> {
        self.inner.remove_watch(track, chat).await
    }

    async fn list_watches(&self, chat: &Chat) -> Result<Vec<WatchEntry>> {
        self.inner.list_watches(chat).await
    }

    async fn watched_tracks(&self, after: Option<&str>, limit: u32) -> Result<Vec<Track>> {
        self.inner.watched_tracks(after, limit).await
    }

    async fn stale_tracks(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Track>> {
        self.inner.stale_tracks(cutoff, after, limit).await
    }

    async fn watchers(&self, track: &Track) -> Result<Vec<Watcher>> {
        self.inner.watchers(track).await
    }

    async fn update_track_status(
        &self,
        track: &Track,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.update_track_status(track, status, at).await
    }

    async fn delete_track(&self, track: &Track) -> Result<()> {
        if track.number == self.fail_on {
            return Err(Error::External(format!("database is locked ({})", track.number)));
        }
        self.inner.delete_track(track).await
    }
}
