//! Playlists and their ordered, duplicate-free video membership.

use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::videos::{VIDEO_COLUMNS, row_to_video};
use super::{EntityStore, VideoRecord, WriteOutcome, new_id, now_timestamp};

const PLAYLIST_COLUMNS: &str = "id, name, description, owner_id, created_at, updated_at";

/// Playlist with its member video ids in insertion order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub videos: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Playlist with member videos resolved. Entries whose video was deleted are
/// dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDetail {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub videos: Vec<VideoRecord>,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityStore {
    pub async fn create_playlist(
        &self,
        owner_id: &str,
        name: &str,
        description: &str,
    ) -> Result<PlaylistRecord> {
        let id = new_id();
        let now = now_timestamp();
        self.conn()
            .execute(
                "INSERT INTO playlists (id, name, description, owner_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id.as_str(), name, description, owner_id, now.as_str()],
            )
            .await
            .context("inserting playlist")?;
        self.find_playlist(&id)
            .await?
            .context("playlist disappeared right after insert")
    }

    pub async fn find_playlist(&self, id: &str) -> Result<Option<PlaylistRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = ?1"),
                params![id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut playlist = row_to_playlist(&row)?;
        playlist.videos = self.playlist_video_ids(&playlist.id).await?;
        Ok(Some(playlist))
    }

    pub async fn find_playlist_detail(&self, id: &str) -> Result<Option<PlaylistDetail>> {
        let Some(playlist) = self.find_playlist(id).await? else {
            return Ok(None);
        };

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIDEO_COLUMNS} FROM playlist_videos pv \
                     JOIN videos v ON v.id = pv.video_id \
                     WHERE pv.playlist_id = ?1 ORDER BY pv.position"
                ),
                params![id],
            )
            .await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row, 0)?);
        }

        Ok(Some(PlaylistDetail {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description,
            owner_id: playlist.owner_id,
            videos,
            created_at: playlist.created_at,
            updated_at: playlist.updated_at,
        }))
    }

    pub async fn list_user_playlists(&self, owner_id: &str) -> Result<Vec<PlaylistRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE owner_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![owner_id],
            )
            .await?;

        let mut playlists = Vec::new();
        while let Some(row) = rows.next().await? {
            playlists.push(row_to_playlist(&row)?);
        }
        for playlist in &mut playlists {
            playlist.videos = self.playlist_video_ids(&playlist.id).await?;
        }
        Ok(playlists)
    }

    async fn playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT video_id FROM playlist_videos WHERE playlist_id = ?1 ORDER BY position",
                params![playlist_id],
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    /// Appends a video at the end of the playlist. `Duplicate` when it is
    /// already a member.
    pub async fn add_playlist_video(
        &self,
        playlist_id: &str,
        video_id: &str,
    ) -> Result<WriteOutcome<()>> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO playlist_videos (playlist_id, video_id, position, added_at) \
                 SELECT ?1, ?2, COALESCE(MAX(position), 0) + 1, ?3 \
                 FROM playlist_videos WHERE playlist_id = ?1",
                params![playlist_id, video_id, now_timestamp()],
            )
            .await
            .context("adding video to playlist")?;
        if inserted == 0 {
            return Ok(WriteOutcome::Duplicate);
        }
        self.touch_playlist(playlist_id).await?;
        Ok(WriteOutcome::Written(()))
    }

    /// Returns false when the video was not a member.
    pub async fn remove_playlist_video(&self, playlist_id: &str, video_id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
                params![playlist_id, video_id],
            )
            .await
            .context("removing video from playlist")?;
        if removed > 0 {
            self.touch_playlist(playlist_id).await?;
        }
        Ok(removed > 0)
    }

    pub async fn update_playlist(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<PlaylistRecord>> {
        self.conn()
            .execute(
                "UPDATE playlists SET name = COALESCE(?2, name), \
                 description = COALESCE(?3, description), updated_at = ?4 WHERE id = ?1",
                params![id, name, description, now_timestamp()],
            )
            .await
            .context("updating playlist")?;
        self.find_playlist(id).await
    }

    pub async fn delete_playlist(&self, id: &str) -> Result<bool> {
        self.conn()
            .execute(
                "DELETE FROM playlist_videos WHERE playlist_id = ?1",
                params![id],
            )
            .await
            .context("clearing playlist entries")?;
        let removed = self
            .conn()
            .execute("DELETE FROM playlists WHERE id = ?1", params![id])
            .await
            .context("deleting playlist")?;
        Ok(removed > 0)
    }

    async fn touch_playlist(&self, id: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE playlists SET updated_at = ?2 WHERE id = ?1",
                params![id, now_timestamp()],
            )
            .await?;
        Ok(())
    }
}

/// `videos` is filled in separately.
fn row_to_playlist(row: &Row) -> Result<PlaylistRecord> {
    Ok(PlaylistRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        videos: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
