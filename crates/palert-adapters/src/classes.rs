//! Class adapter: academy class search scoped to the rule's clubs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use palert_core::{Activity, Address, Category, Club, Player, Rule};
use palert_playtomic::models::Class;
use palert_playtomic::{from_today_floor, parse_provider_time, SearchClassesParams};
use palert_store::SeenStore;

use crate::filters::passes_filters;
use crate::{ensure_category, retain_unseen, AdapterError, Catalog, SourceAdapter, LINK_BASE, PAGE_SIZE};

const CLASS_SORT: &str = "start_date,created_at,ASC";
const CLASS_STATUS_ACTIVE: &str = "PENDING,IN_PROGRESS";
const COURSE_VISIBILITY_PUBLIC: &str = "PUBLIC";

pub struct ClassAdapter {
    catalog: Arc<dyn Catalog>,
    seen: Arc<dyn SeenStore>,
}

impl ClassAdapter {
    pub fn new(catalog: Arc<dyn Catalog>, seen: Arc<dyn SeenStore>) -> Self {
        Self { catalog, seen }
    }
}

#[async_trait]
impl SourceAdapter for ClassAdapter {
    fn category(&self) -> Category {
        Category::Class
    }

    async fn process(&self, rule: &Rule) -> Result<Vec<Activity>, AdapterError> {
        ensure_category(rule, Category::Class)?;

        let params = SearchClassesParams {
            sort: CLASS_SORT.into(),
            status: CLASS_STATUS_ACTIVE.into(),
            tenant_ids: rule.club_ids.clone(),
            include_summary: true,
            course_visibility: COURSE_VISIBILITY_PUBLIC.into(),
            from_start_date: from_today_floor(Utc::now()),
            size: PAGE_SIZE,
            page: 0,
        };

        let classes = self.catalog.search_classes(&params).await?;

        let mut activities = Vec::with_capacity(classes.len());
        for class in classes {
            activities.push(class_to_activity(class)?);
        }
        activities.retain(|a| passes_filters(a, rule));

        Ok(retain_unseen(self.seen.as_ref(), rule, activities).await)
    }
}

/// Transform a wire class into the domain activity shape.
///
/// Classes attached to a course carry their capacity on the course summary;
/// ad-hoc classes fall back to the court resource name and report no open
/// places. The level range is derived from the registered players.
pub fn class_to_activity(class: Class) -> Result<Activity, AdapterError> {
    let starts_at = parse_provider_time(&class.start_date)
        .map_err(|e| AdapterError::Transform(format!("parsing class start date: {e}")))?;
    let ends_at = parse_provider_time(&class.end_date)
        .map_err(|e| AdapterError::Transform(format!("parsing class end date: {e}")))?;

    let registered = class.registration_info.registrations.len() as u32;

    let (name, gender, min_players, max_players, available_places) = match &class.course_summary {
        Some(course) => (
            course.name.clone(),
            course.gender.clone(),
            course.min_players,
            course.max_players,
            course.max_players.saturating_sub(registered),
        ),
        None => (
            class.resource.name.clone(),
            "UNRESTRICTED".to_string(),
            1,
            registered,
            0,
        ),
    };

    let players: Vec<Player> = class
        .registration_info
        .registrations
        .iter()
        .map(|registration| Player {
            id: registration.player.user_id.clone(),
            name: registration.player.name.clone(),
            level: registration.player.level_value,
            team: None,
            link: format!("{LINK_BASE}/profile/user/{}", registration.player.user_id),
        })
        .collect();

    let (min_level, max_level) = players
        .iter()
        .fold(None::<(f64, f64)>, |range, player| match range {
            Some((lo, hi)) => Some((lo.min(player.level), hi.max(player.level))),
            None => Some((player.level, player.level)),
        })
        .unwrap_or((0.0, 0.0));

    Ok(Activity {
        id: class.academy_class_id.clone(),
        category: Category::Class,
        provider_kind: class.kind.clone(),
        name,
        club: Club {
            id: class.tenant.tenant_id.clone(),
            name: class.tenant.tenant_name.clone(),
            address: Address {
                street: class.tenant.address.street.clone(),
                postal_code: class.tenant.address.postal_code.clone(),
                city: class.tenant.address.city.clone(),
                country: class.tenant.address.country.clone(),
            },
            link: format!("{LINK_BASE}/tenant/{}", class.tenant.tenant_id),
        },
        starts_at,
        ends_at,
        duration_minutes: (ends_at - starts_at).num_minutes(),
        min_players,
        max_players,
        min_level,
        max_level,
        price: class.registration_info.base_price.clone(),
        gender,
        available_places,
        players,
        link: format!("{LINK_BASE}/lesson_class/{}", class.academy_class_id),
    })
}
