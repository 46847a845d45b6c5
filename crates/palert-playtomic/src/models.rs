//! Wire models for the catalog's match, class and lesson payloads.
//!
//! Only the fields the domain transformation consumes are modeled; every
//! field defaults so that partial payloads decode instead of failing the
//! whole page.

use serde::Deserialize;

/// A match listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Match {
    pub match_id: String,
    #[serde(default)]
    pub match_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub min_players_per_team: u32,
    #[serde(default)]
    pub max_players_per_team: u32,
    #[serde(default)]
    pub tenant: Tenant,
    #[serde(default)]
    pub min_level: f64,
    #[serde(default)]
    pub max_level: f64,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub gender: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub players: Vec<WirePlayer>,
    #[serde(default)]
    pub min_players: u32,
    #[serde(default)]
    pub max_players: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WirePlayer {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level_value: f64,
}

/// The club/venue that hosts an activity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tenant {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: String,
    #[serde(default)]
    pub address: WireAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

/// An academy class listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Class {
    pub academy_class_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub tenant: Tenant,
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub registration_info: RegistrationInfo,
    #[serde(default)]
    pub course_summary: Option<CourseSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInfo {
    #[serde(default)]
    pub base_price: String,
    #[serde(default)]
    pub registrations: Vec<Registration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub player: WirePlayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub min_players: u32,
    #[serde(default)]
    pub max_players: u32,
}

/// A lesson/tournament listing. The lesson endpoint nests the club address
/// under `tenant_address`, unlike matches and classes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Lesson {
    pub tournament_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tournament_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub min_players: u32,
    #[serde(default)]
    pub max_players: u32,
    #[serde(default)]
    pub available_places: i64,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub tenant: LessonTenant,
    #[serde(default)]
    pub level_description: String,
    #[serde(default)]
    pub registered_players: Vec<LessonPlayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LessonTenant {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: String,
    #[serde(default)]
    pub tenant_address: WireAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LessonPlayer {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub level_value: f64,
}
