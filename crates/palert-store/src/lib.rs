//! Storage contracts for rules, users, schedule entries and seen-sets,
//! plus the SQLite-backed implementation.
//!
//! The schedule store and rule persistence are exposed through one
//! [`RuleStore`] trait: rescheduling is an upsert keyed by rule id, and
//! deleting a rule also drops its schedule entry and seen-set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use palert_core::{Rule, User};

pub mod sqlite;

pub use sqlite::SqliteStore;

pub const CRATE_NAME: &str = "palert-store";

/// Maximum number of due rules returned per schedule poll. Larger backlogs
/// drain across subsequent ticks.
pub const DUE_BATCH_LIMIT: i64 = 100;

/// Maximum seen-set entries retained per rule; oldest entries are evicted
/// first once the cap is exceeded.
pub const SEEN_CAP: i64 = 4096;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Rule persistence and the time-ordered schedule store.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch a rule by id. `Ok(None)` when the rule does not exist — a
    /// dangling schedule entry is a no-op for callers, not a failure.
    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<Rule>, StoreError>;

    async fn list_rules(&self, user_id: Uuid) -> Result<Vec<Rule>, StoreError>;

    async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError>;

    async fn update_rule(&self, rule: &Rule) -> Result<(), StoreError>;

    /// Delete a rule along with its schedule entry and seen-set.
    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError>;

    /// Upsert the due timestamp for a rule. Idempotent, last write wins;
    /// scheduling an unknown rule is not an error.
    async fn schedule_rule(&self, rule_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// All rule ids due at or before `until`, ascending by due time, capped
    /// at [`DUE_BATCH_LIMIT`].
    async fn scheduled_rules(&self, until: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}

/// User persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Per-rule record of already-reported activity identifiers.
///
/// Append-only from the engine's perspective; cleared only when the owning
/// rule is deleted. Once an id is a member it is never surfaced again for
/// that rule (within the [`SEEN_CAP`] retention bound).
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn is_seen(&self, rule_id: Uuid, activity_id: &str) -> Result<bool, StoreError>;

    async fn mark_seen(&self, rule_id: Uuid, activity_id: &str) -> Result<(), StoreError>;

    async fn clear_seen(&self, rule_id: Uuid) -> Result<(), StoreError>;
}
