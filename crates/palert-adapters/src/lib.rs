//! Source adapter contracts + the per-category fetch/transform/filter
//! pipelines.
//!
//! Each adapter turns one rule into the set of catalog activities that
//! newly satisfy it: build a provider query scoped to the rule's clubs and
//! a from-today floor, fetch, transform into the domain shape, apply the
//! filter chain, then drop everything the rule has already been told about.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use palert_core::{Activity, Category, Rule};
use palert_playtomic::client::ProviderError;
use palert_playtomic::models::{Class, Lesson, Match};
use palert_playtomic::{
    PlaytomicClient, SearchClassesParams, SearchLessonsParams, SearchMatchesParams,
};
use palert_store::SeenStore;

pub mod classes;
pub mod filters;
pub mod lessons;
pub mod matches;

pub use classes::ClassAdapter;
pub use lessons::LessonAdapter;
pub use matches::MatchAdapter;

pub const CRATE_NAME: &str = "palert-adapters";

/// Provider page size for every category search.
pub(crate) const PAGE_SIZE: u32 = 100;

pub(crate) const LINK_BASE: &str = "https://app.playtomic.io";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("not a {expected} rule")]
    WrongCategory { expected: Category },
    #[error("fetch: {0}")]
    Provider(#[from] ProviderError),
    #[error("transform: {0}")]
    Transform(String),
}

/// Category-specific fetch + transform + filter pipeline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn category(&self) -> Category;

    /// Evaluate one rule: fetch candidates for its club scope, filter, and
    /// return only activities never reported for this rule before.
    async fn process(&self, rule: &Rule) -> Result<Vec<Activity>, AdapterError>;
}

/// Read side of the catalog provider, one search per category.
///
/// [`PlaytomicClient`] is the production implementation; tests substitute
/// canned feeds.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search_matches(
        &self,
        params: &SearchMatchesParams,
    ) -> Result<Vec<Match>, ProviderError>;

    async fn search_classes(
        &self,
        params: &SearchClassesParams,
    ) -> Result<Vec<Class>, ProviderError>;

    async fn search_lessons(
        &self,
        params: &SearchLessonsParams,
    ) -> Result<Vec<Lesson>, ProviderError>;
}

#[async_trait]
impl Catalog for PlaytomicClient {
    async fn search_matches(
        &self,
        params: &SearchMatchesParams,
    ) -> Result<Vec<Match>, ProviderError> {
        PlaytomicClient::search_matches(self, params).await
    }

    async fn search_classes(
        &self,
        params: &SearchClassesParams,
    ) -> Result<Vec<Class>, ProviderError> {
        PlaytomicClient::search_classes(self, params).await
    }

    async fn search_lessons(
        &self,
        params: &SearchLessonsParams,
    ) -> Result<Vec<Lesson>, ProviderError> {
        PlaytomicClient::search_lessons(self, params).await
    }
}

/// The adapter for every category, dispatched by enum so a new category
/// cannot be added without wiring an adapter here.
pub struct AdapterRegistry {
    matches: Arc<dyn SourceAdapter>,
    classes: Arc<dyn SourceAdapter>,
    lessons: Arc<dyn SourceAdapter>,
}

impl AdapterRegistry {
    pub fn new(catalog: Arc<dyn Catalog>, seen: Arc<dyn SeenStore>) -> Self {
        Self {
            matches: Arc::new(MatchAdapter::new(catalog.clone(), seen.clone())),
            classes: Arc::new(ClassAdapter::new(catalog.clone(), seen.clone())),
            lessons: Arc::new(LessonAdapter::new(catalog, seen)),
        }
    }

    /// Assemble a registry from explicit adapters.
    pub fn from_parts(
        matches: Arc<dyn SourceAdapter>,
        classes: Arc<dyn SourceAdapter>,
        lessons: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            matches,
            classes,
            lessons,
        }
    }

    pub fn adapter(&self, category: Category) -> Arc<dyn SourceAdapter> {
        match category {
            Category::Match => self.matches.clone(),
            Category::Class => self.classes.clone(),
            Category::Lesson => self.lessons.clone(),
        }
    }
}

pub(crate) fn ensure_category(rule: &Rule, expected: Category) -> Result<(), AdapterError> {
    if rule.category == Some(expected) {
        Ok(())
    } else {
        Err(AdapterError::WrongCategory { expected })
    }
}

/// Keep only activities the rule has never surfaced, marking each kept one
/// as seen immediately so a failure later in the pipeline cannot cause a
/// re-notification on the next cycle. Seen-store failures degrade to
/// "unseen" rather than failing the rule, matching membership reads being
/// advisory.
pub(crate) async fn retain_unseen(
    seen: &dyn SeenStore,
    rule: &Rule,
    activities: Vec<Activity>,
) -> Vec<Activity> {
    let mut fresh = Vec::new();
    for activity in activities {
        match seen.is_seen(rule.id, &activity.id).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                warn!(rule_id = %rule.id, activity_id = %activity.id, error = %err,
                      "seen-set lookup failed; treating as unseen");
            }
        }

        if let Err(err) = seen.mark_seen(rule.id, &activity.id).await {
            warn!(rule_id = %rule.id, activity_id = %activity.id, error = %err,
                  "failed to mark activity as seen");
        }
        fresh.push(activity);
    }
    fresh
}
