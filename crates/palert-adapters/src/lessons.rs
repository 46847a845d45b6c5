//! Lesson/tournament adapter.
//!
//! The lesson endpoint accepts a single club per query, so this adapter
//! issues one sub-request per club in the rule's scope and continues past
//! per-club fetch or transform failures instead of aborting the whole rule —
//! a deliberate asymmetry from the match/class adapters, which fail
//! atomically per rule.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use palert_core::{Activity, Address, Category, Club, Player, Rule};
use palert_playtomic::models::Lesson;
use palert_playtomic::{from_today_floor, parse_provider_time, SearchLessonsParams};
use palert_store::SeenStore;

use crate::filters::passes_filters;
use crate::{ensure_category, retain_unseen, AdapterError, Catalog, SourceAdapter, LINK_BASE, PAGE_SIZE};

const LESSON_SORT: &str = "start_date,created_at,ASC";
const LESSON_STATUS_OPEN: &str = "REGISTRATION_OPEN,REGISTRATION_CLOSED,IN_PROGRESS";
const TOURNAMENT_VISIBILITY_PUBLIC: &str = "PUBLIC";

/// Level range assumed when neither the description nor the registered
/// players provide one.
const DEFAULT_LEVEL_RANGE: (f64, f64) = (1.0, 5.0);

pub struct LessonAdapter {
    catalog: Arc<dyn Catalog>,
    seen: Arc<dyn SeenStore>,
}

impl LessonAdapter {
    pub fn new(catalog: Arc<dyn Catalog>, seen: Arc<dyn SeenStore>) -> Self {
        Self { catalog, seen }
    }
}

#[async_trait]
impl SourceAdapter for LessonAdapter {
    fn category(&self) -> Category {
        Category::Lesson
    }

    async fn process(&self, rule: &Rule) -> Result<Vec<Activity>, AdapterError> {
        ensure_category(rule, Category::Lesson)?;

        let mut all_activities = Vec::new();

        for club_id in &rule.club_ids {
            let params = SearchLessonsParams {
                sort: LESSON_SORT.into(),
                tenant_id: club_id.clone(),
                tournament_visibility: TOURNAMENT_VISIBILITY_PUBLIC.into(),
                status: LESSON_STATUS_OPEN.into(),
                from_start_date: from_today_floor(Utc::now()),
                size: PAGE_SIZE,
                page: 0,
            };

            let lessons = match self.catalog.search_lessons(&params).await {
                Ok(lessons) => lessons,
                Err(err) => {
                    warn!(rule_id = %rule.id, club_id = %club_id, error = %err,
                          "lesson fetch failed; skipping club");
                    continue;
                }
            };

            let mut activities = Vec::with_capacity(lessons.len());
            let mut transform_failed = false;
            for lesson in lessons {
                match lesson_to_activity(lesson) {
                    Ok(activity) => activities.push(activity),
                    Err(err) => {
                        warn!(rule_id = %rule.id, club_id = %club_id, error = %err,
                              "lesson transform failed; skipping club");
                        transform_failed = true;
                        break;
                    }
                }
            }
            if transform_failed {
                continue;
            }

            activities.retain(|a| passes_filters(a, rule));
            all_activities.extend(retain_unseen(self.seen.as_ref(), rule, activities).await);
        }

        Ok(all_activities)
    }
}

/// Transform a wire lesson into the domain activity shape.
///
/// The level range comes from the `"min - max"` level description when it
/// parses, then from the registered players, then from
/// [`DEFAULT_LEVEL_RANGE`].
pub fn lesson_to_activity(lesson: Lesson) -> Result<Activity, AdapterError> {
    let starts_at = parse_provider_time(&lesson.start_date)
        .map_err(|e| AdapterError::Transform(format!("parsing lesson start date: {e}")))?;
    let ends_at = parse_provider_time(&lesson.end_date)
        .map_err(|e| AdapterError::Transform(format!("parsing lesson end date: {e}")))?;

    let players: Vec<Player> = lesson
        .registered_players
        .iter()
        .map(|p| Player {
            id: p.user_id.clone(),
            name: p.full_name.clone(),
            level: p.level_value,
            team: None,
            link: format!("{LINK_BASE}/profile/user/{}", p.user_id),
        })
        .collect();

    let described_range = parse_level_range(&lesson.level_description);
    let player_range = players
        .iter()
        .fold(None::<(f64, f64)>, |range, player| match range {
            Some((lo, hi)) => Some((lo.min(player.level), hi.max(player.level))),
            None => Some((player.level, player.level)),
        });
    let (min_level, max_level) = described_range
        .or(player_range)
        .unwrap_or(DEFAULT_LEVEL_RANGE);

    Ok(Activity {
        id: lesson.tournament_id.clone(),
        category: Category::Lesson,
        provider_kind: lesson.kind.clone(),
        name: lesson.tournament_name.clone(),
        club: Club {
            id: lesson.tenant.tenant_id.clone(),
            name: lesson.tenant.tenant_name.clone(),
            address: Address {
                street: lesson.tenant.tenant_address.street.clone(),
                postal_code: lesson.tenant.tenant_address.postal_code.clone(),
                city: lesson.tenant.tenant_address.city.clone(),
                country: lesson.tenant.tenant_address.country.clone(),
            },
            link: format!("{LINK_BASE}/tenant/{}", lesson.tenant.tenant_id),
        },
        starts_at,
        ends_at,
        duration_minutes: (ends_at - starts_at).num_minutes(),
        min_players: lesson.min_players,
        max_players: lesson.max_players,
        min_level,
        max_level,
        price: lesson.price.clone(),
        gender: lesson.gender.clone(),
        available_places: lesson.available_places.max(0) as u32,
        players,
        link: format!("{LINK_BASE}/training/{}", lesson.tournament_id),
    })
}

/// Parse a `"2.5 - 4.0"` style level description.
fn parse_level_range(description: &str) -> Option<(f64, f64)> {
    let (min_raw, max_raw) = description.split_once('-')?;
    let min = min_raw.trim().parse::<f64>().ok()?;
    let max = max_raw.trim().parse::<f64>().ok()?;
    Some((min, max))
}
