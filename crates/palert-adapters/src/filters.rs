//! The rule filter chain applied to transformed activities.
//!
//! Order matters and is fixed: availability, ranking range, date window,
//! title substring. Filters a rule does not define always pass.

use palert_core::{Activity, Rule};

pub fn has_available_places(activity: &Activity) -> bool {
    activity.available_places > 0
}

/// Ranking window check: the activity's level range must sit inside the
/// rule's configured bounds.
pub fn matches_ranking(activity: &Activity, rule: &Rule) -> bool {
    if let Some(min) = rule.min_ranking {
        if activity.min_level < min {
            return false;
        }
    }
    if let Some(max) = rule.max_ranking {
        if activity.max_level > max {
            return false;
        }
    }
    true
}

/// Date window check against the activity start time.
pub fn matches_dates(activity: &Activity, rule: &Rule) -> bool {
    if let Some(start) = rule.start_date {
        if activity.starts_at < start {
            return false;
        }
    }
    if let Some(end) = rule.end_date {
        if activity.starts_at > end {
            return false;
        }
    }
    true
}

/// Case-insensitive title substring check.
pub fn matches_title(activity: &Activity, rule: &Rule) -> bool {
    match rule.title_contains.as_deref() {
        Some(needle) if !needle.is_empty() => activity
            .name
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        _ => true,
    }
}

pub fn passes_filters(activity: &Activity, rule: &Rule) -> bool {
    has_available_places(activity)
        && matches_ranking(activity, rule)
        && matches_dates(activity, rule)
        && matches_title(activity, rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::rule_for;
    use chrono::{Duration, Utc};
    use palert_core::{Address, Category, Club};

    fn activity(level: f64, available: u32, name: &str) -> Activity {
        let starts_at = Utc::now() + Duration::days(1);
        Activity {
            id: format!("a-{level}-{name}"),
            category: Category::Match,
            provider_kind: "COMPETITIVE".into(),
            name: name.into(),
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
            min_level: level,
            max_level: level,
            price: "12 EUR".into(),
            gender: "MIXED".into(),
            available_places: available,
            players: vec![],
            link: String::new(),
        }
    }

    #[test]
    fn ranking_window_keeps_only_in_range_levels() {
        let mut rule = rule_for(Category::Match);
        rule.min_ranking = Some(3.0);
        rule.max_ranking = Some(4.5);

        let candidates = [
            activity(2.9, 2, "low"),
            activity(3.5, 2, "mid"),
            activity(4.6, 2, "high"),
        ];
        let kept: Vec<_> = candidates
            .iter()
            .filter(|a| passes_filters(a, &rule))
            .collect();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].min_level, 3.5);
    }

    #[test]
    fn ranking_bounds_are_inclusive() {
        let mut rule = rule_for(Category::Match);
        rule.min_ranking = Some(3.0);
        rule.max_ranking = Some(4.5);

        assert!(matches_ranking(&activity(3.0, 1, "edge-low"), &rule));
        assert!(matches_ranking(&activity(4.5, 1, "edge-high"), &rule));
    }

    #[test]
    fn full_activities_are_dropped() {
        let rule = rule_for(Category::Match);
        assert!(!passes_filters(&activity(3.0, 0, "full"), &rule));
        assert!(passes_filters(&activity(3.0, 1, "open"), &rule));
    }

    #[test]
    fn date_window_compares_start_time() {
        let mut rule = rule_for(Category::Match);
        let a = activity(3.0, 1, "next week");

        rule.start_date = Some(a.starts_at - Duration::hours(1));
        rule.end_date = Some(a.starts_at + Duration::hours(1));
        assert!(matches_dates(&a, &rule));

        rule.start_date = Some(a.starts_at + Duration::hours(1));
        assert!(!matches_dates(&a, &rule));

        rule.start_date = None;
        rule.end_date = Some(a.starts_at - Duration::hours(1));
        assert!(!matches_dates(&a, &rule));
    }

    #[test]
    fn title_filter_is_case_insensitive() {
        let mut rule = rule_for(Category::Class);
        rule.title_contains = Some("beginner".into());

        assert!(matches_title(&activity(3.0, 1, "Beginner Clinic"), &rule));
        assert!(matches_title(&activity(3.0, 1, "BEGINNER clinic"), &rule));
        assert!(!matches_title(&activity(3.0, 1, "Advanced Drill"), &rule));
    }

    #[test]
    fn empty_title_filter_passes_everything() {
        let mut rule = rule_for(Category::Class);
        rule.title_contains = Some(String::new());
        assert!(matches_title(&activity(3.0, 1, "anything"), &rule));

        rule.title_contains = None;
        assert!(matches_title(&activity(3.0, 1, "anything"), &rule));
    }
}
