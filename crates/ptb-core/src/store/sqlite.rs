//! SQLite implementation of `TrackStore`.
//!
//! Writes go through the single-connection writer pool; plain reads use the
//! reader pool. Timestamps are stored as microseconds since the Unix epoch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use crate::{
    domain::{Chat, ChatId, Track, WatchEntry, Watcher},
    store::{DatabasePool, TrackStore},
    Error, Result,
};

pub struct SqliteTrackStore {
    pool: DatabasePool,
}

impl SqliteTrackStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Open the database at `database_url`, running migrations first.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(DatabasePool::new(database_url).await?))
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(us)
        .ok_or_else(|| Error::External(format!("timestamp out of range: {us}")))
}

fn chat_from_row(row: &SqliteRow) -> Result<Chat> {
    Ok(Chat {
        chat_id: ChatId(row.try_get("chat_id")?),
        enabled: row.try_get("enabled")?,
    })
}

fn track_from_row(row: &SqliteRow) -> Result<Track> {
    Ok(Track {
        number: row.try_get("number")?,
        status: row.try_get("status")?,
        updated_at: from_micros(row.try_get("updated_at")?)?,
    })
}

fn tracks_from_rows(rows: &[SqliteRow]) -> Result<Vec<Track>> {
    rows.iter().map(track_from_row).collect()
}

// ---------------------------------------------------------------------------
// TrackStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TrackStore for SqliteTrackStore {
    async fn find_or_create_chat(&self, chat_id: ChatId) -> Result<Chat> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"INSERT INTO chats (chat_id, enabled) VALUES (?, 1)
               ON CONFLICT (chat_id) DO UPDATE SET chat_id = excluded.chat_id
               RETURNING chat_id, enabled"#,
        )
        .bind(chat_id.0)
        .fetch_one(&self.pool.writer)
        .await?;

        chat_from_row(&row)
    }

    async fn set_chat_enabled(&self, chat_id: ChatId, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE chats SET enabled = ? WHERE chat_id = ?")
            .bind(enabled)
            .bind(chat_id.0)
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }

    async fn find_or_create_track(&self, number: &str) -> Result<Track> {
        let row = sqlx::query(
            r#"INSERT INTO tracks (number, status, updated_at) VALUES (?, NULL, ?)
               ON CONFLICT (number) DO UPDATE SET number = excluded.number
               RETURNING number, status, updated_at"#,
        )
        .bind(number)
        .bind(to_micros(Utc::now()))
        .fetch_one(&self.pool.writer)
        .await?;

        track_from_row(&row)
    }

    async fn find_track(&self, number: &str) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT number, status, updated_at FROM tracks WHERE number = ?")
            .bind(number)
            .fetch_optional(&self.pool.reader)
            .await?;

        row.as_ref().map(track_from_row).transpose()
    }

    async fn add_watch(&self, track: &Track, chat: &Chat, comment: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO watches (chat_id, track_number, comment, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (chat_id, track_number) DO UPDATE SET comment = excluded.comment"#,
        )
        .bind(chat.chat_id.0)
        .bind(&track.number)
        .bind(comment)
        .bind(to_micros(Utc::now()))
        .execute(&self.pool.writer)
        .await?;

        Ok(())
    }

    async fn remove_watch(&self, track: &Track, chat: &Chat) -> Result<()> {
        let res = sqlx::query("DELETE FROM watches WHERE chat_id = ? AND track_number = ?")
            .bind(chat.chat_id.0)
            .bind(&track.number)
            .execute(&self.pool.writer)
            .await?;

        if res.rows_affected() == 0 {
            return Err(Error::NotWatched {
                chat_id: chat.chat_id,
                number: track.number.clone(),
            });
        }
        Ok(())
    }

    async fn list_watches(&self, chat: &Chat) -> Result<Vec<WatchEntry>> {
        let rows = sqlx::query(
            r#"SELECT t.number, t.status, t.updated_at, w.comment, w.created_at
               FROM watches w
               JOIN tracks t ON t.number = w.track_number
               WHERE w.chat_id = ?
               ORDER BY w.created_at, w.id"#,
        )
        .bind(chat.chat_id.0)
        .fetch_all(&self.pool.reader)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(WatchEntry {
                    track: track_from_row(row)?,
                    comment: row.try_get("comment")?,
                    created_at: from_micros(row.try_get("created_at")?)?,
                })
            })
            .collect()
    }

    async fn watched_tracks(&self, after: Option<&str>, limit: u32) -> Result<Vec<Track>> {
        let rows = sqlx::query(
            r#"SELECT t.number, t.status, t.updated_at
               FROM tracks t
               WHERE EXISTS (SELECT 1 FROM watches w WHERE w.track_number = t.number)
                 AND (?1 IS NULL OR t.number > ?1)
               ORDER BY t.number
               LIMIT ?2"#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await?;

        tracks_from_rows(&rows)
    }

    async fn stale_tracks(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Track>> {
        let rows = sqlx::query(
            r#"SELECT number, status, updated_at
               FROM tracks
               WHERE updated_at < ?1
                 AND (?2 IS NULL OR number > ?2)
               ORDER BY number
               LIMIT ?3"#,
        )
        .bind(to_micros(cutoff))
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await?;

        tracks_from_rows(&rows)
    }

    async fn watchers(&self, track: &Track) -> Result<Vec<Watcher>> {
        let rows = sqlx::query(
            r#"SELECT c.chat_id, c.enabled, w.comment
               FROM watches w
               JOIN chats c ON c.chat_id = w.chat_id
               WHERE w.track_number = ?
               ORDER BY w.created_at, w.id"#,
        )
        .bind(&track.number)
        .fetch_all(&self.pool.reader)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Watcher {
                    chat: chat_from_row(row)?,
                    comment: row.try_get("comment")?,
                })
            })
            .collect()
    }

    async fn update_track_status(
        &self,
        track: &Track,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let res = sqlx::query("UPDATE tracks SET status = ?, updated_at = ? WHERE number = ?")
            .bind(status)
            .bind(to_micros(at))
            .bind(&track.number)
            .execute(&self.pool.writer)
            .await?;

        if res.rows_affected() == 0 {
            tracing::debug!(number = %track.number, "status update for a track that no longer exists");
        }
        Ok(())
    }

    async fn delete_track(&self, track: &Track) -> Result<()> {
        sqlx::query("DELETE FROM tracks WHERE number = ?")
            .bind(&track.number)
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}
