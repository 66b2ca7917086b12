use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::{EntityStore, new_id, now_timestamp};
use crate::pagination::{Page, PageRequest};

const TWEET_COLUMNS: &str = "id, content, owner_id, created_at, updated_at";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    pub id: String,
    pub content: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityStore {
    pub async fn create_tweet(&self, owner_id: &str, content: &str) -> Result<TweetRecord> {
        let id = new_id();
        let now = now_timestamp();
        self.conn()
            .execute(
                "INSERT INTO tweets (id, content, owner_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.as_str(), content, owner_id, now.as_str()],
            )
            .await
            .context("inserting tweet")?;
        self.find_tweet(&id)
            .await?
            .context("tweet disappeared right after insert")
    }

    pub async fn find_tweet(&self, id: &str) -> Result<Option<TweetRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TWEET_COLUMNS} FROM tweets WHERE id = ?1"),
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_tweet(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_tweet(&self, id: &str, content: &str) -> Result<Option<TweetRecord>> {
        self.conn()
            .execute(
                "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, now_timestamp()],
            )
            .await
            .context("updating tweet")?;
        self.find_tweet(id).await
    }

    pub async fn delete_tweet(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM tweets WHERE id = ?1", params![id])
            .await
            .context("deleting tweet")?;
        Ok(removed > 0)
    }

    pub async fn list_user_tweets(
        &self,
        owner_id: &str,
        request: PageRequest,
    ) -> Result<Page<TweetRecord>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM tweets WHERE owner_id = ?1",
                params![owner_id],
            )
            .await?;

        let (limit, offset) = request.sql_bounds();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TWEET_COLUMNS} FROM tweets WHERE owner_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
                ),
                params![owner_id, limit, offset],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_tweet(&row)?);
        }
        Ok(Page::new(items, total, request))
    }
}

fn row_to_tweet(row: &Row) -> Result<TweetRecord> {
    Ok(TweetRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
