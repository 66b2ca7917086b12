//! Entity Store: every persistent record lives in a single SQLite-compatible
//! database opened through libsql.
//!
//! The store never wraps multi-step operations in transactions; handlers run
//! concurrently against one shared connection. Uniqueness of users, likes,
//! subscriptions and playlist entries is enforced by the schema instead.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use libsql::{Builder, Connection, params};
use uuid::Uuid;

pub mod aggregate;
pub mod comments;
pub mod playlists;
pub mod relations;
pub mod tweets;
pub mod users;
pub mod videos;

pub use aggregate::{ChannelProfile, ChannelStats, HistoryEntry, LikedVideo};
pub use comments::{CommentRecord, CommentView};
pub use playlists::{PlaylistDetail, PlaylistRecord};
pub use relations::{
    LikeKey, LikeTarget, Relation, SelfSubscription, SubscriptionKey, ToggleOutcome, Toggled,
};
pub use tweets::TweetRecord;
pub use users::{ImageSlot, NewUser, OwnerSummary, UserProfile, UserRecord};
pub use videos::{NewVideo, VideoFilter, VideoRecord, VideoView};

/// Result of a write that can collide with a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Written(T),
    Duplicate,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        PRAGMA busy_timeout=5000;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            avatar TEXT NOT NULL DEFAULT '',
            avatar_id TEXT,
            cover_image TEXT NOT NULL DEFAULT '',
            cover_image_id TEXT,
            refresh_token TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            video_file TEXT NOT NULL,
            video_file_id TEXT NOT NULL,
            thumbnail TEXT NOT NULL,
            thumbnail_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL CHECK (duration > 0),
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            video_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tweets (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS likes (
            id TEXT PRIMARY KEY,
            target_kind TEXT NOT NULL CHECK (target_kind IN ('video', 'tweet', 'comment')),
            target_id TEXT NOT NULL,
            liked_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (target_kind, target_id, liked_by)
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            subscriber_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (channel_id, subscriber_id),
            CHECK (channel_id <> subscriber_id)
        );

        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS playlist_videos (
            playlist_id TEXT NOT NULL,
            video_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (playlist_id, video_id)
        );

        CREATE TABLE IF NOT EXISTS watch_history (
            user_id TEXT NOT NULL,
            video_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            watched_at TEXT NOT NULL,
            PRIMARY KEY (user_id, video_id)
        );

        CREATE INDEX IF NOT EXISTS idx_videos_owner ON videos(owner_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_tweets_owner ON tweets(owner_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_likes_target ON likes(target_kind, target_id);
        CREATE INDEX IF NOT EXISTS idx_likes_actor ON likes(liked_by, target_kind, created_at);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_subscriber ON subscriptions(subscriber_id);
        CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists(owner_id);
        "#,
    )
    .await?;
    Ok(())
}

/// Handle to the entity database. Cloning is not needed; share it behind an
/// `Arc` for the lifetime of the process.
pub struct EntityStore {
    conn: Connection,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").finish_non_exhaustive()
    }
}

impl EntityStore {
    /// Opens (and if necessary creates) the database and provisions the
    /// schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening database {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Cheap round trip used by the healthcheck.
    pub async fn ping(&self) -> Result<()> {
        let mut rows = self.conn.query("SELECT 1", params![]).await?;
        rows.next().await?.context("database returned no row")?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs a `SELECT COUNT(*) ...` style query and returns the single value.
    pub(crate) async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await?;
        let row = rows.next().await?.context("count query returned no row")?;
        let value: i64 = row.get(0)?;
        Ok(u64::try_from(value).unwrap_or(0))
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Microsecond precision keeps lexical order equal to chronological order.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    let message = format!("{err:#}");
    message.contains("UNIQUE constraint failed")
}
