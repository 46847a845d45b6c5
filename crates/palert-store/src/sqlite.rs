//! SQLite-backed implementation of the storage traits.
//!
//! The schema is created on connect. A single pooled connection is used:
//! SQLite serializes writers anyway, and it keeps `sqlite::memory:` tests
//! honest (every pool connection would otherwise see its own database).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use palert_core::{Category, Rule, User};

use crate::{RuleStore, SeenStore, StoreError, UserStore, DUE_BATCH_LIMIT, SEEN_CAP};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS rules (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        category TEXT,
        club_ids TEXT NOT NULL,
        min_ranking REAL,
        max_ranking REAL,
        start_date TEXT,
        end_date TEXT,
        title_contains TEXT,
        active INTEGER NOT NULL,
        last_checked TEXT,
        last_notification TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_rules_user ON rules(user_id)",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS schedule (
        rule_id TEXT PRIMARY KEY,
        due_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_schedule_due ON schedule(due_at)",
    "CREATE TABLE IF NOT EXISTS seen (
        rule_id TEXT NOT NULL,
        activity_id TEXT NOT NULL,
        PRIMARY KEY (rule_id, activity_id)
    )",
];

/// SQLite store implementing [`RuleStore`], [`UserStore`] and [`SeenStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        debug!(url, "sqlite store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("invalid uuid {raw}: {e}")))
}

fn rule_from_row(row: &SqliteRow) -> Result<Rule, StoreError> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let category: Option<String> = row.try_get("category")?;
    let club_ids: String = row.try_get("club_ids")?;

    let category = category
        .map(|raw| Category::from_str(&raw).map_err(StoreError::Corrupt))
        .transpose()?;

    Ok(Rule {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        name: row.try_get("name")?,
        category,
        club_ids: serde_json::from_str(&club_ids)?,
        min_ranking: row.try_get("min_ranking")?,
        max_ranking: row.try_get("max_ranking")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        title_contains: row.try_get("title_contains")?,
        active: row.try_get("active")?,
        last_checked: row.try_get("last_checked")?,
        last_notification: row.try_get("last_notification")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let id: String = row.try_get("id")?;
    Ok(User {
        id: parse_uuid(&id)?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<Rule>, StoreError> {
        let row = sqlx::query("SELECT * FROM rules WHERE id = ?")
            .bind(rule_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(rule_from_row).transpose()
    }

    async fn list_rules(&self, user_id: Uuid) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query("SELECT * FROM rules WHERE user_id = ? ORDER BY created_at")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rules (id, user_id, name, category, club_ids, min_ranking, max_ranking,
                                start_date, end_date, title_contains, active, last_checked,
                                last_notification, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(rule.user_id.to_string())
        .bind(&rule.name)
        .bind(rule.category.map(|c| c.as_str()))
        .bind(serde_json::to_string(&rule.club_ids)?)
        .bind(rule.min_ranking)
        .bind(rule.max_ranking)
        .bind(rule.start_date)
        .bind(rule.end_date)
        .bind(&rule.title_contains)
        .bind(rule.active)
        .bind(rule.last_checked)
        .bind(rule.last_notification)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE rules SET name = ?, category = ?, club_ids = ?, min_ranking = ?,
                              max_ranking = ?, start_date = ?, end_date = ?, title_contains = ?,
                              active = ?, last_checked = ?, last_notification = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&rule.name)
        .bind(rule.category.map(|c| c.as_str()))
        .bind(serde_json::to_string(&rule.club_ids)?)
        .bind(rule.min_ranking)
        .bind(rule.max_ranking)
        .bind(rule.start_date)
        .bind(rule.end_date)
        .bind(&rule.title_contains)
        .bind(rule.active)
        .bind(rule.last_checked)
        .bind(rule.last_notification)
        .bind(Utc::now())
        .bind(rule.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "rule",
                id: rule.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError> {
        let id = rule_id.to_string();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM schedule WHERE rule_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM seen WHERE rule_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "rule", id });
        }
        Ok(())
    }

    async fn schedule_rule(&self, rule_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO schedule (rule_id, due_at) VALUES (?, ?)
             ON CONFLICT(rule_id) DO UPDATE SET due_at = excluded.due_at",
        )
        .bind(rule_id.to_string())
        .bind(at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scheduled_rules(&self, until: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT rule_id FROM schedule WHERE due_at <= ? ORDER BY due_at ASC LIMIT ?",
        )
        .bind(until.timestamp())
        .bind(DUE_BATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("rule_id")?;
                parse_uuid(&id)
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET email = ?, name = ?, updated_at = ? WHERE id = ?")
            .bind(&user.email)
            .bind(&user.name)
            .bind(Utc::now())
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "user",
                id: user.id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SeenStore for SqliteStore {
    async fn is_seen(&self, rule_id: Uuid, activity_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM seen WHERE rule_id = ? AND activity_id = ?")
            .bind(rule_id.to_string())
            .bind(activity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_seen(&self, rule_id: Uuid, activity_id: &str) -> Result<(), StoreError> {
        let id = rule_id.to_string();
        sqlx::query("INSERT OR IGNORE INTO seen (rule_id, activity_id) VALUES (?, ?)")
            .bind(&id)
            .bind(activity_id)
            .execute(&self.pool)
            .await?;

        // Enforce the per-rule retention bound, oldest insertions first.
        sqlx::query(
            "DELETE FROM seen WHERE rule_id = ? AND rowid NOT IN
               (SELECT rowid FROM seen WHERE rule_id = ? ORDER BY rowid DESC LIMIT ?)",
        )
        .bind(&id)
        .bind(&id)
        .bind(SEEN_CAP)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_seen(&self, rule_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM seen WHERE rule_id = ?")
            .bind(rule_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.expect("store")
    }

    fn sample_rule(user_id: Uuid) -> Rule {
        let now = Utc::now();
        Rule {
            id: Uuid::new_v4(),
            user_id,
            name: "weekend matches".into(),
            category: Some(Category::Match),
            club_ids: vec!["club-1".into(), "club-2".into()],
            min_ranking: Some(3.0),
            max_ranking: Some(4.5),
            start_date: None,
            end_date: None,
            title_contains: None,
            active: true,
            last_checked: None,
            last_notification: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rule_round_trip() {
        let store = memory_store().await;
        let rule = sample_rule(Uuid::new_v4());
        store.create_rule(&rule).await.unwrap();

        let loaded = store.get_rule(rule.id).await.unwrap().expect("rule");
        assert_eq!(loaded.id, rule.id);
        assert_eq!(loaded.name, rule.name);
        assert_eq!(loaded.category, Some(Category::Match));
        assert_eq!(loaded.club_ids, rule.club_ids);
        assert_eq!(loaded.min_ranking, Some(3.0));
        assert!(loaded.active);
    }

    #[tokio::test]
    async fn get_missing_rule_is_none() {
        let store = memory_store().await;
        assert!(store.get_rule(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_rule_is_not_found() {
        let store = memory_store().await;
        let rule = sample_rule(Uuid::new_v4());
        let err = store.update_rule(&rule).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "rule", .. }));
    }

    #[tokio::test]
    async fn update_persists_bookkeeping_fields() {
        let store = memory_store().await;
        let mut rule = sample_rule(Uuid::new_v4());
        store.create_rule(&rule).await.unwrap();

        rule.last_checked = Some(Utc::now());
        rule.last_notification = Some(Utc::now());
        store.update_rule(&rule).await.unwrap();

        let loaded = store.get_rule(rule.id).await.unwrap().unwrap();
        assert!(loaded.last_checked.is_some());
        assert!(loaded.last_notification.is_some());
    }

    #[tokio::test]
    async fn list_rules_is_scoped_to_user() {
        let store = memory_store().await;
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.create_rule(&sample_rule(owner)).await.unwrap();
        store.create_rule(&sample_rule(owner)).await.unwrap();
        store.create_rule(&sample_rule(other)).await.unwrap();

        assert_eq!(store.list_rules(owner).await.unwrap().len(), 2);
        assert_eq!(store.list_rules(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_clears_schedule_and_seen_set() {
        let store = memory_store().await;
        let rule = sample_rule(Uuid::new_v4());
        store.create_rule(&rule).await.unwrap();
        store.schedule_rule(rule.id, Utc::now()).await.unwrap();
        store.mark_seen(rule.id, "activity-1").await.unwrap();

        store.delete_rule(rule.id).await.unwrap();

        assert!(store.get_rule(rule.id).await.unwrap().is_none());
        let due = store
            .scheduled_rules(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(due.is_empty());
        assert!(!store.is_seen(rule.id, "activity-1").await.unwrap());
    }

    #[tokio::test]
    async fn schedule_is_an_upsert() {
        let store = memory_store().await;
        let rule_id = Uuid::new_v4();
        let now = Utc::now();

        store.schedule_rule(rule_id, now).await.unwrap();
        store.schedule_rule(rule_id, now + Duration::seconds(30)).await.unwrap();

        let due = store.scheduled_rules(now + Duration::hours(1)).await.unwrap();
        assert_eq!(due, vec![rule_id]);
    }

    #[tokio::test]
    async fn scheduling_an_unknown_rule_is_not_an_error() {
        let store = memory_store().await;
        store.schedule_rule(Uuid::new_v4(), Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn due_rules_are_time_ordered_and_filtered() {
        let store = memory_store().await;
        let now = Utc::now();
        let (early, mid, late) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store.schedule_rule(late, now + Duration::hours(2)).await.unwrap();
        store.schedule_rule(early, now - Duration::minutes(10)).await.unwrap();
        store.schedule_rule(mid, now - Duration::minutes(5)).await.unwrap();

        let due = store.scheduled_rules(now).await.unwrap();
        assert_eq!(due, vec![early, mid]);
    }

    #[tokio::test]
    async fn due_batch_is_capped() {
        let store = memory_store().await;
        let base = Utc::now() - Duration::hours(1);
        for i in 0..(DUE_BATCH_LIMIT + 20) {
            store
                .schedule_rule(Uuid::new_v4(), base + Duration::seconds(i))
                .await
                .unwrap();
        }

        let due = store.scheduled_rules(Utc::now()).await.unwrap();
        assert_eq!(due.len(), DUE_BATCH_LIMIT as usize);
    }

    #[tokio::test]
    async fn seen_set_membership() {
        let store = memory_store().await;
        let rule_id = Uuid::new_v4();

        assert!(!store.is_seen(rule_id, "a-1").await.unwrap());
        store.mark_seen(rule_id, "a-1").await.unwrap();
        store.mark_seen(rule_id, "a-1").await.unwrap(); // idempotent
        assert!(store.is_seen(rule_id, "a-1").await.unwrap());

        store.clear_seen(rule_id).await.unwrap();
        assert!(!store.is_seen(rule_id, "a-1").await.unwrap());
    }

    #[tokio::test]
    async fn seen_set_evicts_oldest_past_cap() {
        let store = memory_store().await;
        let rule_id = Uuid::new_v4();

        for i in 0..(SEEN_CAP + 10) {
            store.mark_seen(rule_id, &format!("a-{i}")).await.unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen WHERE rule_id = ?")
            .bind(rule_id.to_string())
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, SEEN_CAP);

        assert!(!store.is_seen(rule_id, "a-0").await.unwrap());
        let newest = format!("a-{}", SEEN_CAP + 9);
        assert!(store.is_seen(rule_id, &newest).await.unwrap());
    }

    #[tokio::test]
    async fn user_round_trip_and_email_lookup() {
        let store = memory_store().await;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "player@example.com".into(),
            name: Some("Player One".into()),
            created_at: now,
            updated_at: now,
        };
        store.create_user(&user).await.unwrap();

        let by_id = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, user.email);

        let by_email = store
            .get_user_by_email("player@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(store
            .get_user_by_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("palert.db").display());

        let rule = sample_rule(Uuid::new_v4());
        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.create_rule(&rule).await.unwrap();
        }

        let store = SqliteStore::connect(&url).await.unwrap();
        assert!(store.get_rule(rule.id).await.unwrap().is_some());
    }
}
