//! Tracking store: the only component allowed to read or write chats, tracks
//! and watches.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Chat, ChatId, Track, WatchEntry, Watcher},
    Result,
};

pub mod pool;
pub mod sqlite;

pub use pool::DatabasePool;
pub use sqlite::SqliteTrackStore;

/// Rows fetched per round-trip when walking tracks lazily.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Persistence port for the tracking engine.
///
/// Identity uniqueness (one chat per id, one track per number, one watch per
/// chat/track pair) is enforced by the store itself, so callers may run
/// concurrently without extra locking.
#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn find_or_create_chat(&self, chat_id: ChatId) -> Result<Chat>;

    /// Hook for the delivery layer: disable a chat that cannot be reached, or
    /// re-enable it once it writes to us again.
    async fn set_chat_enabled(&self, chat_id: ChatId, enabled: bool) -> Result<()>;

    async fn find_or_create_track(&self, number: &str) -> Result<Track>;

    async fn find_track(&self, number: &str) -> Result<Option<Track>>;

    /// Upsert: an existing watch keeps its creation time and gets the new comment.
    async fn add_watch(&self, track: &Track, chat: &Chat, comment: &str) -> Result<()>;

    /// Fails with `Error::NotWatched` when the pair has no watch. Never deletes the track.
    async fn remove_watch(&self, track: &Track, chat: &Chat) -> Result<()>;

    /// Watches of one chat, oldest first.
    async fn list_watches(&self, chat: &Chat) -> Result<Vec<WatchEntry>>;

    /// One page of tracks with at least one watch, ordered by number, strictly after `after`.
    async fn watched_tracks(&self, after: Option<&str>, limit: u32) -> Result<Vec<Track>>;

    /// One page of tracks with `updated_at < cutoff`, ordered by number, strictly after `after`.
    async fn stale_tracks(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Track>>;

    /// Chats currently watching `track`, in subscription order.
    async fn watchers(&self, track: &Track) -> Result<Vec<Watcher>>;

    /// Atomically replace the (status, updated_at) pair.
    async fn update_track_status(
        &self,
        track: &Track,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete the track together with every watch referencing it.
    async fn delete_track(&self, track: &Track) -> Result<()>;
}

#[derive(Clone, Copy, Debug)]
enum PagedQuery {
    Watched,
    StaleBefore(DateTime<Utc>),
}

/// Lazy, keyset-paginated walk over tracks.
///
/// Pages are keyed by track number, so rows deleted behind the cursor (the
/// retention sweep deletes as it goes) never shift the next page.
pub struct TrackPager<'a> {
    store: &'a dyn TrackStore,
    query: PagedQuery,
    page_size: u32,
    after: Option<String>,
    buffer: VecDeque<Track>,
    exhausted: bool,
}

impl<'a> TrackPager<'a> {
    /// Every track with at least one watch.
    pub fn watched(store: &'a dyn TrackStore, page_size: u32) -> Self {
        Self::new(store, PagedQuery::Watched, page_size)
    }

    /// Every track last refreshed strictly before `cutoff`.
    pub fn stale(store: &'a dyn TrackStore, cutoff: DateTime<Utc>, page_size: u32) -> Self {
        Self::new(store, PagedQuery::StaleBefore(cutoff), page_size)
    }

    fn new(store: &'a dyn TrackStore, query: PagedQuery, page_size: u32) -> Self {
        Self {
            store,
            query,
            page_size: page_size.max(1),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Track>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let after = self.after.as_deref();
        let page = match self.query {
            PagedQuery::Watched => self.store.watched_tracks(after, self.page_size).await?,
            PagedQuery::StaleBefore(cutoff) => {
                self.store
                    .stale_tracks(cutoff, after, self.page_size)
                    .await?
            }
        };

        if (page.len() as u32) < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after = Some(last.number.clone());
        }
        self.buffer.extend(page);
        Ok(())
    }
}
