//! Per-rule evaluation pipeline.
//!
//! `process_rule` runs one full cycle for one rule: load, skip if inactive,
//! stamp `last_checked`, evaluate through the source adapters (fanning out
//! across all categories when the rule names none), notify the owner about
//! anything new, and persist bookkeeping. Errors are absorbed at the lowest
//! boundary that keeps sibling work unaffected; the only error allowed out
//! of here is "every branch failed and nothing was found", which the
//! scheduler logs and still follows with a reschedule.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use palert_adapters::{AdapterError, AdapterRegistry};
use palert_core::{Activity, Category, Rule};
use palert_notify::Notifier;
use palert_store::{RuleStore, StoreError, UserStore};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("evaluate: {0}")]
    Evaluation(#[from] AdapterError),
}

/// Orchestrates one rule's evaluation cycle.
pub struct RuleProcessor {
    store: Arc<dyn RuleStore>,
    users: Arc<dyn UserStore>,
    registry: Arc<AdapterRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl RuleProcessor {
    pub fn new(
        store: Arc<dyn RuleStore>,
        users: Arc<dyn UserStore>,
        registry: Arc<AdapterRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            users,
            registry,
            notifier,
        }
    }

    pub async fn process_rule(&self, rule_id: Uuid) -> Result<(), ProcessError> {
        let Some(mut rule) = self.store.get_rule(rule_id).await? else {
            // A dangling schedule entry for a deleted rule is a no-op.
            warn!(rule_id = %rule_id, "rule not found; skipping");
            return Ok(());
        };

        if !rule.active {
            debug!(rule_id = %rule_id, name = %rule.name, "skipping inactive rule");
            return Ok(());
        }

        debug!(rule_id = %rule_id, name = %rule.name, category = ?rule.category, "processing rule");
        rule.last_checked = Some(Utc::now());

        let outcome = self.evaluate(&rule).await;

        match &outcome {
            Ok(activities) if !activities.is_empty() => {
                self.notify_owner(&mut rule, activities).await;
            }
            Ok(_) => {
                info!(rule_id = %rule_id, "no new activities for rule");
            }
            Err(_) => {}
        }

        if let Err(err) = self.store.update_rule(&rule).await {
            error!(rule_id = %rule_id, error = %err, "failed to persist rule bookkeeping");
        }

        outcome.map(|_| ()).map_err(ProcessError::from)
    }

    /// Dispatch to the rule's adapter, or fan out across every category for
    /// an all-categories rule. Fan-out merge policy: any activities at all
    /// count as success even if some branches failed; an error only
    /// propagates when every branch came back empty-handed and at least one
    /// failed.
    async fn evaluate(&self, rule: &Rule) -> Result<Vec<Activity>, AdapterError> {
        if let Some(category) = rule.category {
            return self.registry.adapter(category).process(rule).await;
        }

        let mut branches = JoinSet::new();
        for category in Category::ALL {
            let adapter = self.registry.adapter(category);
            let branch_rule = rule.with_category(category);
            branches.spawn(async move { (category, adapter.process(&branch_rule).await) });
        }

        let mut activities = Vec::new();
        let mut first_error: Option<AdapterError> = None;

        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((category, Ok(mut branch_activities))) => {
                    debug!(rule_id = %rule.id, category = %category,
                           count = branch_activities.len(), "branch complete");
                    activities.append(&mut branch_activities);
                }
                Ok((category, Err(err))) => {
                    error!(rule_id = %rule.id, category = %category, error = %err,
                           "branch failed");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(rule_id = %rule.id, error = %join_err, "branch panicked");
                }
            }
        }

        match first_error {
            Some(err) if activities.is_empty() => Err(err),
            _ => Ok(activities),
        }
    }

    async fn notify_owner(&self, rule: &mut Rule, activities: &[Activity]) {
        let user = match self.users.get_user(rule.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(rule_id = %rule.id, user_id = %rule.user_id,
                      "rule owner not found; skipping notification");
                return;
            }
            Err(err) => {
                error!(rule_id = %rule.id, user_id = %rule.user_id, error = %err,
                       "failed to load rule owner");
                return;
            }
        };

        info!(rule_id = %rule.id, activities = activities.len(), "sending notification");
        match self
            .notifier
            .notify_new_activities(&user, rule, activities)
            .await
        {
            Ok(()) => {
                rule.last_notification = Some(Utc::now());
            }
            Err(err) => {
                // Not retried this cycle; the next evaluation is the retry.
                error!(rule_id = %rule.id, error = %err, "failed to send notification");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use palert_adapters::{AdapterError, SourceAdapter};
    use palert_core::{Activity, Address, Category, Club, Rule, User};
    use palert_notify::{Notifier, NotifyError};
    use palert_store::{RuleStore, StoreError, UserStore};

    pub fn sample_rule(category: Option<Category>) -> Rule {
        let now = Utc::now();
        Rule {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test rule".into(),
            category,
            club_ids: vec!["club-1".into()],
            min_ranking: None,
            max_ranking: None,
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

    pub fn sample_activity(id: &str) -> Activity {
        let starts_at = Utc::now() + Duration::days(1);
        Activity {
            id: id.into(),
            category: Category::Match,
            provider_kind: "COMPETITIVE".into(),
            name: format!("Activity {id}"),
            club: Club {
                id: "club-1".into(),
                name: "Central Padel".into(),
                address: Address::default(),
                link: String::new(),
            },
            starts_at,
            ends_at: starts_at + Duration::minutes(90),
            duration_minutes: 90,
            min_players: 4,
            max_players: 4,
            min_level: 3.0,
            max_level: 4.0,
            price: "14 EUR".into(),
            gender: "MIXED".into(),
            available_places: 2,
            players: vec![],
            link: String::new(),
        }
    }

    /// In-memory rule store recording schedule and update calls.
    #[derive(Default)]
    pub struct MockRuleStore {
        pub rules: Mutex<HashMap<Uuid, Rule>>,
        pub due: Mutex<Vec<Uuid>>,
        pub scheduled: Mutex<Vec<(Uuid, DateTime<Utc>)>>,
        pub updates: Mutex<Vec<Rule>>,
    }

    impl MockRuleStore {
        pub fn with_rule(rule: Rule) -> Self {
            let store = Self::default();
            store.rules.lock().unwrap().insert(rule.id, rule);
            store
        }
    }

    #[async_trait]
    impl RuleStore for MockRuleStore {
        async fn get_rule(&self, rule_id: Uuid) -> Result<Option<Rule>, StoreError> {
            Ok(self.rules.lock().unwrap().get(&rule_id).cloned())
        }

        async fn list_rules(&self, _user_id: Uuid) -> Result<Vec<Rule>, StoreError> {
            Ok(self.rules.lock().unwrap().values().cloned().collect())
        }

        async fn create_rule(&self, rule: &Rule) -> Result<(), StoreError> {
            self.rules.lock().unwrap().insert(rule.id, rule.clone());
            Ok(())
        }

        async fn update_rule(&self, rule: &Rule) -> Result<(), StoreError> {
            self.rules.lock().unwrap().insert(rule.id, rule.clone());
            self.updates.lock().unwrap().push(rule.clone());
            Ok(())
        }

        async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError> {
            self.rules.lock().unwrap().remove(&rule_id);
            Ok(())
        }

        async fn schedule_rule(
            &self,
            rule_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.scheduled.lock().unwrap().push((rule_id, at));
            Ok(())
        }

        async fn scheduled_rules(&self, _until: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
            Ok(std::mem::take(&mut *self.due.lock().unwrap()))
        }
    }

    #[derive(Default)]
    pub struct MockUserStore {
        pub users: Mutex<HashMap<Uuid, User>>,
    }

    impl MockUserStore {
        pub fn with_user(user: User) -> Self {
            let store = Self::default();
            store.users.lock().unwrap().insert(user.id, user);
            store
        }
    }

    #[async_trait]
    impl UserStore for MockUserStore {
        async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
            Ok(self.users.lock().unwrap().get(&user_id).cloned())
        }

        async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn create_user(&self, user: &User) -> Result<(), StoreError> {
            self.users.lock().unwrap().insert(user.id, user.clone());
            Ok(())
        }

        async fn update_user(&self, user: &User) -> Result<(), StoreError> {
            self.users.lock().unwrap().insert(user.id, user.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockNotifier {
        pub sent: Mutex<Vec<Vec<String>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify_new_activities(
            &self,
            _user: &User,
            _rule: &Rule,
            activities: &[Activity],
        ) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Smtp("mock failure".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(activities.iter().map(|a| a.id.clone()).collect());
            Ok(())
        }

        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    /// Adapter returning a fixed outcome, counting invocations.
    pub struct StubAdapter {
        pub category: Category,
        pub result: Result<Vec<Activity>, String>,
        pub calls: AtomicUsize,
    }

    impl StubAdapter {
        pub fn ok(category: Category, activities: Vec<Activity>) -> Self {
            Self {
                category,
                result: Ok(activities),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(category: Category) -> Self {
            Self {
                category,
                result: Err("provider unavailable".into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn category(&self) -> Category {
            self.category
        }

        async fn process(&self, _rule: &Rule) -> Result<Vec<Activity>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(activities) => Ok(activities.clone()),
                Err(message) => Err(AdapterError::Transform(message.clone())),
            }
        }
    }
}
