//! Relation Toggle: likes and subscriptions are created when absent and
//! removed when present.
//!
//! The schema carries a UNIQUE constraint over every relation key, so two
//! concurrent "add" toggles for the same pair cannot both insert. The toggle
//! deletes first; when nothing was deleted it inserts with
//! `ON CONFLICT DO NOTHING`, treating a collision as "already added".

use anyhow::{Context, Result};
use libsql::Value;
use serde::Serialize;

use super::{EntityStore, new_id, now_timestamp};

/// A join row keyed by a target and an actor.
pub trait Relation {
    const TABLE: &'static str;
    /// How many leading entries of [`Relation::key`] identify the target.
    const TARGET_COLUMNS: usize;

    /// Column/value pairs identifying the row: target columns first, then the
    /// actor.
    fn key(&self) -> Vec<(&'static str, Value)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
    Video,
    Tweet,
    Comment,
}

impl LikeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Tweet => "tweet",
            Self::Comment => "comment",
        }
    }
}

/// Exactly one liked target per like; the variant replaces three nullable
/// columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeKey {
    pub target: LikeTarget,
    pub target_id: String,
    pub liked_by: String,
}

impl LikeKey {
    pub fn new(target: LikeTarget, target_id: impl Into<String>, liked_by: impl Into<String>) -> Self {
        Self {
            target,
            target_id: target_id.into(),
            liked_by: liked_by.into(),
        }
    }
}

impl Relation for LikeKey {
    const TABLE: &'static str = "likes";
    const TARGET_COLUMNS: usize = 2;

    fn key(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("target_kind", self.target.as_str().into()),
            ("target_id", self.target_id.clone().into()),
            ("liked_by", self.liked_by.clone().into()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("You cannot subscribe to your own channel")]
pub struct SelfSubscription;

/// A (channel, subscriber) pair. Construction refuses self-subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKey {
    channel_id: String,
    subscriber_id: String,
}

impl SubscriptionKey {
    pub fn new(
        channel_id: impl Into<String>,
        subscriber_id: impl Into<String>,
    ) -> Result<Self, SelfSubscription> {
        let channel_id = channel_id.into();
        let subscriber_id = subscriber_id.into();
        if channel_id == subscriber_id {
            return Err(SelfSubscription);
        }
        Ok(Self {
            channel_id,
            subscriber_id,
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Relation for SubscriptionKey {
    const TABLE: &'static str = "subscriptions";
    const TARGET_COLUMNS: usize = 1;

    fn key(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("channel_id", self.channel_id.clone().into()),
            ("subscriber_id", self.subscriber_id.clone().into()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

/// State after a toggle plus the live relation count for the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggled {
    pub outcome: ToggleOutcome,
    pub count: u64,
}

impl Toggled {
    pub fn is_added(&self) -> bool {
        self.outcome == ToggleOutcome::Added
    }
}

/// `col1 = ?1 AND col2 = ?2 ...`
fn predicate(columns: &[(&'static str, Value)]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(idx, (column, _))| format!("{column} = ?{}", idx + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn values(columns: &[(&'static str, Value)]) -> Vec<Value> {
    columns.iter().map(|(_, value)| value.clone()).collect()
}

impl EntityStore {
    pub async fn toggle<R: Relation>(&self, relation: &R) -> Result<Toggled> {
        let key = relation.key();

        let removed = self
            .conn()
            .execute(
                &format!("DELETE FROM {} WHERE {}", R::TABLE, predicate(&key)),
                values(&key),
            )
            .await
            .with_context(|| format!("removing {} row", R::TABLE))?;

        let outcome = if removed > 0 {
            ToggleOutcome::Removed
        } else {
            let columns: Vec<&str> = key.iter().map(|(column, _)| *column).collect();
            let placeholders: Vec<String> = (1..=key.len() + 2).map(|n| format!("?{n}")).collect();
            let mut params = vec![Value::from(new_id())];
            params.extend(values(&key));
            params.push(Value::from(now_timestamp()));

            self.conn()
                .execute(
                    &format!(
                        "INSERT INTO {} (id, {}, created_at) VALUES ({}) ON CONFLICT DO NOTHING",
                        R::TABLE,
                        columns.join(", "),
                        placeholders.join(", ")
                    ),
                    params,
                )
                .await
                .with_context(|| format!("inserting {} row", R::TABLE))?;
            ToggleOutcome::Added
        };

        let count = self.count_related(relation).await?;
        tracing::debug!(table = R::TABLE, ?outcome, count, "relation toggled");
        Ok(Toggled { outcome, count })
    }

    /// Live number of relations pointing at the relation's target.
    pub async fn count_related<R: Relation>(&self, relation: &R) -> Result<u64> {
        let mut key = relation.key();
        key.truncate(R::TARGET_COLUMNS);
        self.count(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", R::TABLE, predicate(&key)),
            values(&key),
        )
        .await
    }
}
