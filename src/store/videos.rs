//! Video rows: upload metadata, publish state and view counters.

use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::{EntityStore, OwnerSummary, new_id, now_timestamp};
use crate::pagination::{Page, PageRequest};

/// Column order must match `row_to_video`.
pub(crate) const VIDEO_COLUMNS: &str = "v.id, v.owner_id, v.video_file, v.video_file_id, \
     v.thumbnail, v.thumbnail_id, v.title, v.description, v.views, v.duration, \
     v.is_published, v.created_at, v.updated_at";
pub(crate) const VIDEO_COLUMN_COUNT: i32 = 13;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub owner_id: String,
    pub video_file: String,
    #[serde(skip)]
    pub video_file_id: String,
    pub thumbnail: String,
    #[serde(skip)]
    pub thumbnail_id: String,
    pub title: String,
    pub description: String,
    pub views: i64,
    /// Whole seconds, always positive.
    pub duration: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Video with its owner projection. The owner is `None` when the account no
/// longer resolves.
#[derive(Debug, Clone, Serialize)]
pub struct VideoView {
    #[serde(flatten)]
    pub video: VideoRecord,
    pub owner: Option<OwnerSummary>,
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub owner_id: String,
    pub video_file: String,
    pub video_file_id: String,
    pub thumbnail: String,
    pub thumbnail_id: String,
    pub title: String,
    pub description: String,
    pub duration: i64,
}

/// Filter for video listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoFilter<'a> {
    pub owner_id: Option<&'a str>,
    pub include_unpublished: bool,
}

impl EntityStore {
    /// Persists a freshly uploaded video. New videos start unpublished.
    pub async fn create_video(&self, video: NewVideo) -> Result<VideoRecord> {
        let id = new_id();
        let now = now_timestamp();
        self.conn()
            .execute(
                "INSERT INTO videos (id, owner_id, video_file, video_file_id, thumbnail, \
                 thumbnail_id, title, description, views, duration, is_published, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, 0, ?10, ?10)",
                params![
                    id.as_str(),
                    video.owner_id,
                    video.video_file,
                    video.video_file_id,
                    video.thumbnail,
                    video.thumbnail_id,
                    video.title,
                    video.description,
                    video.duration,
                    now.as_str(),
                ],
            )
            .await
            .context("inserting video")?;

        self.find_video(&id)
            .await?
            .context("video disappeared right after insert")
    }

    pub async fn find_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video(&row, 0)?)),
            None => Ok(None),
        }
    }

    pub async fn find_video_view(&self, id: &str) -> Result<Option<VideoView>> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIDEO_COLUMNS}, u.id, u.username, u.full_name, u.avatar \
                     FROM videos v LEFT JOIN users u ON u.id = v.owner_id \
                     WHERE v.id = ?1"
                ),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video_view(&row)?)),
            None => Ok(None),
        }
    }

    /// Applies the provided title/description; absent fields keep their value.
    pub async fn update_video_details(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<VideoRecord>> {
        self.conn()
            .execute(
                "UPDATE videos SET title = COALESCE(?2, title), \
                 description = COALESCE(?3, description), updated_at = ?4 WHERE id = ?1",
                params![id, title, description, now_timestamp()],
            )
            .await
            .context("updating video details")?;
        self.find_video(id).await
    }

    pub async fn replace_thumbnail(&self, id: &str, url: &str, public_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE videos SET thumbnail = ?2, thumbnail_id = ?3, updated_at = ?4 \
                 WHERE id = ?1",
                params![id, url, public_id, now_timestamp()],
            )
            .await
            .context("replacing thumbnail")?;
        Ok(())
    }

    pub async fn toggle_publish(&self, id: &str) -> Result<Option<VideoRecord>> {
        self.conn()
            .execute(
                "UPDATE videos SET is_published = 1 - is_published, updated_at = ?2 \
                 WHERE id = ?1",
                params![id, now_timestamp()],
            )
            .await
            .context("toggling publish state")?;
        self.find_video(id).await
    }

    pub async fn increment_views(&self, id: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE videos SET views = views + 1 WHERE id = ?1",
                params![id],
            )
            .await
            .context("incrementing views")?;
        Ok(())
    }

    /// Deletes the row only. Likes, comments, playlist entries and history
    /// rows pointing at it are left for readers to filter.
    pub async fn delete_video(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM videos WHERE id = ?1", params![id])
            .await
            .context("deleting video")?;
        Ok(removed > 0)
    }

    /// Newest-first page of videos with owner projections.
    pub async fn list_videos(
        &self,
        filter: VideoFilter<'_>,
        request: PageRequest,
    ) -> Result<Page<VideoView>> {
        let predicate = "(?1 IS NULL OR v.owner_id = ?1) AND (?2 = 1 OR v.is_published = 1)";
        let include_unpublished = i64::from(filter.include_unpublished);

        let total = self
            .count(
                &format!("SELECT COUNT(*) FROM videos v WHERE {predicate}"),
                params![filter.owner_id, include_unpublished],
            )
            .await?;

        let (limit, offset) = request.sql_bounds();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIDEO_COLUMNS}, u.id, u.username, u.full_name, u.avatar \
                     FROM videos v LEFT JOIN users u ON u.id = v.owner_id \
                     WHERE {predicate} \
                     ORDER BY v.created_at DESC, v.rowid DESC \
                     LIMIT ?3 OFFSET ?4"
                ),
                params![filter.owner_id, include_unpublished, limit, offset],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_video_view(&row)?);
        }
        Ok(Page::new(items, total, request))
    }
}

/// Decodes `VIDEO_COLUMNS` starting at column `start`.
pub(crate) fn row_to_video(row: &Row, start: i32) -> Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(start)?,
        owner_id: row.get(start + 1)?,
        video_file: row.get(start + 2)?,
        video_file_id: row.get(start + 3)?,
        thumbnail: row.get(start + 4)?,
        thumbnail_id: row.get(start + 5)?,
        title: row.get(start + 6)?,
        description: row.get(start + 7)?,
        views: row.get(start + 8)?,
        duration: row.get(start + 9)?,
        is_published: row.get::<i64>(start + 10).map(|value| value != 0)?,
        created_at: row.get(start + 11)?,
        updated_at: row.get(start + 12)?,
    })
}

/// `VIDEO_COLUMNS` followed by a LEFT JOINed owner (`id, username, full_name, avatar`).
pub(crate) fn row_to_video_view(row: &Row) -> Result<VideoView> {
    let video = row_to_video(row, 0)?;
    let owner = match row.get::<Option<String>>(VIDEO_COLUMN_COUNT)? {
        Some(_) => Some(OwnerSummary::from_row(row, VIDEO_COLUMN_COUNT)?),
        None => None,
    };
    Ok(VideoView { video, owner })
}
