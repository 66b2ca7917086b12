//! Aggregation Layer: read models composed across several tables.

use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::videos::{VIDEO_COLUMNS, VIDEO_COLUMN_COUNT, VideoView, row_to_video_view};
use super::{EntityStore, OwnerSummary};
use crate::pagination::{Page, PageRequest};

/// Public view of a channel as seen by one viewer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub avatar: String,
    pub cover_image: String,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

pub type HistoryEntry = VideoView;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideo {
    pub liked_at: String,
    pub video: VideoView,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_videos: u64,
    pub total_subscribers: u64,
    pub total_likes: u64,
    pub total_views: u64,
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl EntityStore {
    /// Resolves a channel by username together with its subscription counts
    /// and whether `viewer_id` subscribes to it, in a single read.
    pub async fn channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfile>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT u.id, u.full_name, u.username, u.avatar, u.cover_image, \
                 (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id), \
                 (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id), \
                 EXISTS (SELECT 1 FROM subscriptions s \
                         WHERE s.channel_id = u.id AND s.subscriber_id = ?2) \
                 FROM users u WHERE u.username = ?1",
                params![username.to_lowercase(), viewer_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(ChannelProfile {
            id: row.get(0)?,
            full_name: row.get(1)?,
            username: row.get(2)?,
            avatar: row.get(3)?,
            cover_image: row.get(4)?,
            subscribers_count: non_negative(row.get(5)?),
            channels_subscribed_to_count: non_negative(row.get(6)?),
            is_subscribed: row.get::<i64>(7)? != 0,
        }))
    }

    /// Watched videos in the order they were (last) watched, each with its
    /// owner projection. Deleted videos are skipped.
    pub async fn watch_history(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIDEO_COLUMNS}, u.id, u.username, u.full_name, u.avatar \
                     FROM watch_history h \
                     JOIN videos v ON v.id = h.video_id \
                     LEFT JOIN users u ON u.id = v.owner_id \
                     WHERE h.user_id = ?1 ORDER BY h.position"
                ),
                params![user_id],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_video_view(&row)?);
        }
        Ok(entries)
    }

    /// Videos liked by `user_id`, newest like first.
    ///
    /// The page is cut from the like rows and then populated; likes whose
    /// video has been deleted are dropped afterwards, so a page may hold fewer
    /// than `limit` items while `total` still counts them.
    pub async fn liked_videos(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<Page<LikedVideo>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM likes WHERE liked_by = ?1 AND target_kind = 'video'",
                params![user_id],
            )
            .await?;

        let (limit, offset) = request.sql_bounds();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIDEO_COLUMNS}, u.id, u.username, u.full_name, u.avatar, \
                     l.created_at \
                     FROM likes l \
                     LEFT JOIN videos v ON v.id = l.target_id \
                     LEFT JOIN users u ON u.id = v.owner_id \
                     WHERE l.liked_by = ?1 AND l.target_kind = 'video' \
                     ORDER BY l.created_at DESC, l.rowid DESC \
                     LIMIT ?2 OFFSET ?3"
                ),
                params![user_id, limit, offset],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(liked) = row_to_liked_video(&row)? {
                items.push(liked);
            }
        }
        Ok(Page::new(items, total, request))
    }

    pub async fn channel_stats(&self, channel_id: &str) -> Result<ChannelStats> {
        let mut rows = self
            .conn()
            .query(
                "SELECT \
                 (SELECT COUNT(*) FROM videos WHERE owner_id = ?1), \
                 (SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?1), \
                 (SELECT COUNT(*) FROM likes l JOIN videos v ON v.id = l.target_id \
                  WHERE l.target_kind = 'video' AND v.owner_id = ?1), \
                 (SELECT COALESCE(SUM(views), 0) FROM videos WHERE owner_id = ?1)",
                params![channel_id],
            )
            .await?;
        let row = rows.next().await?.context("stats query returned no row")?;
        Ok(ChannelStats {
            total_videos: non_negative(row.get(0)?),
            total_subscribers: non_negative(row.get(1)?),
            total_likes: non_negative(row.get(2)?),
            total_views: non_negative(row.get(3)?),
        })
    }

    /// Accounts subscribed to `channel_id`, newest subscription first.
    pub async fn channel_subscribers(
        &self,
        channel_id: &str,
        request: PageRequest,
    ) -> Result<Page<OwnerSummary>> {
        self.subscription_peers("s.channel_id", "s.subscriber_id", channel_id, request)
            .await
    }

    /// Channels `subscriber_id` is subscribed to, newest subscription first.
    pub async fn subscribed_channels(
        &self,
        subscriber_id: &str,
        request: PageRequest,
    ) -> Result<Page<OwnerSummary>> {
        self.subscription_peers("s.subscriber_id", "s.channel_id", subscriber_id, request)
            .await
    }

    async fn subscription_peers(
        &self,
        anchor_column: &str,
        peer_column: &str,
        anchor_id: &str,
        request: PageRequest,
    ) -> Result<Page<OwnerSummary>> {
        let total = self
            .count(
                &format!(
                    "SELECT COUNT(*) FROM subscriptions s JOIN users u ON u.id = {peer_column} \
                     WHERE {anchor_column} = ?1"
                ),
                params![anchor_id],
            )
            .await?;

        let (limit, offset) = request.sql_bounds();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT u.id, u.username, u.full_name, u.avatar \
                     FROM subscriptions s JOIN users u ON u.id = {peer_column} \
                     WHERE {anchor_column} = ?1 \
                     ORDER BY s.created_at DESC, s.rowid DESC LIMIT ?2 OFFSET ?3"
                ),
                params![anchor_id, limit, offset],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(OwnerSummary::from_row(&row, 0)?);
        }
        Ok(Page::new(items, total, request))
    }
}

/// `None` when the liked video no longer exists.
fn row_to_liked_video(row: &Row) -> Result<Option<LikedVideo>> {
    if row.get::<Option<String>>(0)?.is_none() {
        return Ok(None);
    }
    let video = row_to_video_view(row)?;
    let liked_at = row.get(VIDEO_COLUMN_COUNT + 4)?;
    Ok(Some(LikedVideo { liked_at, video }))
}
