use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::{EntityStore, OwnerSummary, new_id, now_timestamp};
use crate::pagination::{Page, PageRequest};

const COMMENT_COLUMNS: &str = "c.id, c.content, c.video_id, c.owner_id, c.created_at, c.updated_at";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: String,
    pub content: String,
    pub video_id: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: CommentRecord,
    pub owner: Option<OwnerSummary>,
}

impl EntityStore {
    pub async fn create_comment(
        &self,
        video_id: &str,
        owner_id: &str,
        content: &str,
    ) -> Result<CommentRecord> {
        let id = new_id();
        let now = now_timestamp();
        self.conn()
            .execute(
                "INSERT INTO comments (id, content, video_id, owner_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id.as_str(), content, video_id, owner_id, now.as_str()],
            )
            .await
            .context("inserting comment")?;
        self.find_comment(&id)
            .await?
            .context("comment disappeared right after insert")
    }

    pub async fn find_comment(&self, id: &str) -> Result<Option<CommentRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_comment(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_comment_view(&self, id: &str) -> Result<Option<CommentView>> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMMENT_COLUMNS}, u.id, u.username, u.full_name, u.avatar \
                     FROM comments c LEFT JOIN users u ON u.id = c.owner_id WHERE c.id = ?1"
                ),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_comment_view(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_comment(&self, id: &str, content: &str) -> Result<Option<CommentRecord>> {
        self.conn()
            .execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, now_timestamp()],
            )
            .await
            .context("updating comment")?;
        self.find_comment(id).await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![id])
            .await
            .context("deleting comment")?;
        Ok(removed > 0)
    }

    /// Newest-first comments on a video, each with its author.
    pub async fn list_video_comments(
        &self,
        video_id: &str,
        request: PageRequest,
    ) -> Result<Page<CommentView>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM comments WHERE video_id = ?1",
                params![video_id],
            )
            .await?;

        let (limit, offset) = request.sql_bounds();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMMENT_COLUMNS}, u.id, u.username, u.full_name, u.avatar \
                     FROM comments c LEFT JOIN users u ON u.id = c.owner_id \
                     WHERE c.video_id = ?1 \
                     ORDER BY c.created_at DESC, c.rowid DESC \
                     LIMIT ?2 OFFSET ?3"
                ),
                params![video_id, limit, offset],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_comment_view(&row)?);
        }
        Ok(Page::new(items, total, request))
    }
}

fn row_to_comment(row: &Row) -> Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        video_id: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_comment_view(row: &Row) -> Result<CommentView> {
    let comment = row_to_comment(row)?;
    let owner = match row.get::<Option<String>>(6)? {
        Some(_) => Some(OwnerSummary::from_row(row, 6)?),
        None => None,
    };
    Ok(CommentView { comment, owner })
}
