//! Match adapter: open-match search scoped to the rule's clubs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use palert_core::{Activity, Address, Category, Club, Player, Rule};
use palert_playtomic::models::Match;
use palert_playtomic::{from_today_floor, parse_provider_time, SearchMatchesParams};
use palert_store::SeenStore;

use crate::filters::passes_filters;
use crate::{ensure_category, retain_unseen, AdapterError, Catalog, SourceAdapter, LINK_BASE, PAGE_SIZE};

const MATCH_SORT: &str = "start_date,ASC";
const SPORT_PADEL: &str = "PADEL";
const VISIBILITY_VISIBLE: &str = "VISIBLE";

pub struct MatchAdapter {
    catalog: Arc<dyn Catalog>,
    seen: Arc<dyn SeenStore>,
}

impl MatchAdapter {
    pub fn new(catalog: Arc<dyn Catalog>, seen: Arc<dyn SeenStore>) -> Self {
        Self { catalog, seen }
    }
}

#[async_trait]
impl SourceAdapter for MatchAdapter {
    fn category(&self) -> Category {
        Category::Match
    }

    async fn process(&self, rule: &Rule) -> Result<Vec<Activity>, AdapterError> {
        ensure_category(rule, Category::Match)?;

        let params = SearchMatchesParams {
            sort: MATCH_SORT.into(),
            has_players: true,
            sport_id: SPORT_PADEL.into(),
            tenant_ids: rule.club_ids.clone(),
            visibility: VISIBILITY_VISIBLE.into(),
            from_start_date: from_today_floor(Utc::now()),
            size: PAGE_SIZE,
            page: 0,
        };

        let matches = self.catalog.search_matches(&params).await?;

        let mut activities = Vec::with_capacity(matches.len());
        for m in matches {
            activities.push(match_to_activity(m)?);
        }
        activities.retain(|a| passes_filters(a, rule));

        Ok(retain_unseen(self.seen.as_ref(), rule, activities).await)
    }
}

/// Transform a wire match into the domain activity shape. Capacity is the
/// sum across teams; available places floor at zero.
pub fn match_to_activity(m: Match) -> Result<Activity, AdapterError> {
    let starts_at = parse_provider_time(&m.start_date)
        .map_err(|e| AdapterError::Transform(format!("parsing match start date: {e}")))?;
    let ends_at = parse_provider_time(&m.end_date)
        .map_err(|e| AdapterError::Transform(format!("parsing match end date: {e}")))?;

    let mut min_players = 0u32;
    let mut max_players = 0u32;
    let mut registered = 0u32;
    let mut players = Vec::new();

    for team in &m.teams {
        min_players += team.min_players;
        max_players += team.max_players;
        registered += team.players.len() as u32;

        // The provider labels teams "0"/"1"; surface them as "A"/"B".
        let team_name = match team.team_id.as_str() {
            "0" => "A".to_string(),
            "1" => "B".to_string(),
            other => other.to_string(),
        };

        for p in &team.players {
            players.push(Player {
                id: p.user_id.clone(),
                name: p.name.clone(),
                level: p.level_value,
                team: Some(team_name.clone()),
                link: format!("{LINK_BASE}/profile/user/{}", p.user_id),
            });
        }
    }

    Ok(Activity {
        id: m.match_id.clone(),
        category: Category::Match,
        provider_kind: m.match_type.clone(),
        name: format!("Padel Match at {}", m.location),
        club: Club {
            id: m.tenant.tenant_id.clone(),
            name: m.tenant.tenant_name.clone(),
            address: Address {
                street: m.tenant.address.street.clone(),
                postal_code: m.tenant.address.postal_code.clone(),
                city: m.tenant.address.city.clone(),
                country: m.tenant.address.country.clone(),
            },
            link: format!("{LINK_BASE}/tenant/{}", m.tenant.tenant_id),
        },
        starts_at,
        ends_at,
        duration_minutes: (ends_at - starts_at).num_minutes(),
        min_players,
        max_players,
        min_level: m.min_level,
        max_level: m.max_level,
        price: m.price,
        gender: m.gender,
        available_places: max_players.saturating_sub(registered),
        players,
        link: format!("{LINK_BASE}/match/{}", m.match_id),
    })
}
