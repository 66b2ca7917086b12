//! User accounts, credentials bookkeeping and watch history writes.

use anyhow::{Context, Result};
use libsql::{Row, params};
use serde::Serialize;

use super::{EntityStore, WriteOutcome, is_unique_violation, new_id, now_timestamp};

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, avatar, avatar_id, \
     cover_image, cover_image_id, refresh_token, created_at, updated_at";

/// Full user row. Never serialized directly: it carries the password hash and
/// the active refresh credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub avatar: String,
    pub avatar_id: Option<String>,
    pub cover_image: String,
    pub cover_image_id: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// What the API is allowed to show about an account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            cover_image: user.cover_image.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

/// Minimal owner projection nested inside videos, comments and history.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

impl OwnerSummary {
    /// Decodes four consecutive columns `id, username, full_name, avatar`.
    pub(crate) fn from_row(row: &Row, start: i32) -> Result<Self> {
        Ok(Self {
            id: row.get(start)?,
            username: row.get(start + 1)?,
            full_name: row.get(start + 2)?,
            avatar: row.get(start + 3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub avatar: String,
    pub avatar_id: Option<String>,
    pub cover_image: String,
    pub cover_image_id: Option<String>,
}

/// Which of the two profile images a replacement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Avatar,
    CoverImage,
}

impl ImageSlot {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            Self::Avatar => ("avatar", "avatar_id"),
            Self::CoverImage => ("cover_image", "cover_image_id"),
        }
    }
}

impl EntityStore {
    /// Inserts a new account. Username and email are stored lowercase; a
    /// collision on either yields `Duplicate`.
    pub async fn create_user(&self, user: NewUser) -> Result<WriteOutcome<UserRecord>> {
        let id = new_id();
        let now = now_timestamp();
        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?10)"
                ),
                params![
                    id.as_str(),
                    user.username.to_lowercase(),
                    user.email.to_lowercase(),
                    user.password_hash,
                    user.full_name,
                    user.avatar,
                    user.avatar_id,
                    user.cover_image,
                    user.cover_image_id,
                    now.as_str(),
                ],
            )
            .await
            .map_err(anyhow::Error::from);

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Duplicate),
            Err(err) => return Err(err.context("inserting user")),
        }

        let record = self
            .find_user_by_id(&id)
            .await?
            .context("user disappeared right after insert")?;
        Ok(WriteOutcome::Written(record))
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        self.fetch_user("id = ?1", id).await
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.fetch_user("username = ?1", &username.to_lowercase())
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.fetch_user("email = ?1", &email.to_lowercase()).await
    }

    async fn fetch_user(&self, predicate: &str, value: &str) -> Result<Option<UserRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"),
                params![value],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// True when another account (other than `except_id`) already uses the
    /// username or the email.
    pub async fn identity_taken(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except_id: Option<&str>,
    ) -> Result<bool> {
        let taken = self
            .count(
                "SELECT COUNT(*) FROM users \
                 WHERE (username = ?1 OR email = ?2) AND id <> COALESCE(?3, '')",
                params![
                    username.map(str::to_lowercase),
                    email.map(str::to_lowercase),
                    except_id,
                ],
            )
            .await?;
        Ok(taken > 0)
    }

    /// Overwrites (or clears) the single active refresh credential.
    pub async fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE users SET refresh_token = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, token, now_timestamp()],
            )
            .await
            .context("storing refresh token")?;
        Ok(())
    }

    pub async fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, password_hash, now_timestamp()],
            )
            .await
            .context("updating password hash")?;
        Ok(())
    }

    /// Updates the editable account fields. `username` is only changed when
    /// given.
    pub async fn update_account(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
        username: Option<&str>,
    ) -> Result<WriteOutcome<UserRecord>> {
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET full_name = ?2, email = ?3, \
                 username = COALESCE(?4, username), updated_at = ?5 WHERE id = ?1",
                params![
                    user_id,
                    full_name,
                    email.to_lowercase(),
                    username.map(str::to_lowercase),
                    now_timestamp(),
                ],
            )
            .await
            .map_err(anyhow::Error::from);

        match updated {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Duplicate),
            Err(err) => return Err(err.context("updating account")),
        }

        let record = self
            .find_user_by_id(user_id)
            .await?
            .context("user missing after account update")?;
        Ok(WriteOutcome::Written(record))
    }

    /// Points a profile image at a freshly uploaded asset and returns the
    /// asset id it replaced, if any, so the caller can remove it.
    pub async fn replace_user_image(
        &self,
        user_id: &str,
        slot: ImageSlot,
        url: &str,
        public_id: &str,
    ) -> Result<Option<String>> {
        let (url_column, id_column) = slot.columns();

        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {id_column} FROM users WHERE id = ?1"),
                params![user_id],
            )
            .await?;
        let previous: Option<String> = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => None,
        };

        self.conn()
            .execute(
                &format!(
                    "UPDATE users SET {url_column} = ?2, {id_column} = ?3, updated_at = ?4 \
                     WHERE id = ?1"
                ),
                params![user_id, url, public_id, now_timestamp()],
            )
            .await
            .with_context(|| format!("replacing {url_column}"))?;

        Ok(previous.filter(|old| old != public_id))
    }

    /// Appends a video to the user's watch history, moving it to the end when
    /// it was already watched.
    pub async fn record_watch(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO watch_history (user_id, video_id, position, watched_at) \
                 SELECT ?1, ?2, COALESCE(MAX(position), 0) + 1, ?3 \
                 FROM watch_history WHERE user_id = ?1 \
                 ON CONFLICT (user_id, video_id) \
                 DO UPDATE SET position = excluded.position, watched_at = excluded.watched_at",
                params![user_id, video_id, now_timestamp()],
            )
            .await
            .context("recording watch history")?;
        Ok(())
    }
}

fn row_to_user(row: &Row) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        avatar: row.get(5)?,
        avatar_id: row.get(6)?,
        cover_image: row.get(7)?,
        cover_image_id: row.get(8)?,
        refresh_token: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
