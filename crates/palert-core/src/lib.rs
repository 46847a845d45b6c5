//! Core domain model and configuration for the padel activity alert engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;

pub const CRATE_NAME: &str = "palert-core";

/// Activity category tracked by the engine.
///
/// A rule either names a single category or none at all, in which case it
/// covers every category (see [`Rule::category`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Match,
    Class,
    Lesson,
}

impl Category {
    /// All categories, in fan-out order.
    pub const ALL: [Category; 3] = [Category::Match, Category::Class, Category::Lesson];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Match => "match",
            Category::Class => "class",
            Category::Lesson => "lesson",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match" => Ok(Category::Match),
            "class" => Ok(Category::Class),
            "lesson" => Ok(Category::Lesson),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// A persisted user specification of which activities to watch for.
///
/// Owned by a single user, scoped to one or more clubs, optionally narrowed
/// by ranking range, date window and title substring. `last_checked` and
/// `last_notification` are bookkeeping fields written only by the rule
/// processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// `None` means the rule covers all categories.
    pub category: Option<Category>,
    pub club_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ranking: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ranking: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notification: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Shallow copy with the category pinned, used when fanning an
    /// all-categories rule out to the per-category adapters.
    pub fn with_category(&self, category: Category) -> Rule {
        Rule {
            category: Some(category),
            ..self.clone()
        }
    }
}

/// A rule owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One concrete candidate session fetched from the external catalog.
///
/// Activities are ephemeral: they live for the duration of a single rule
/// evaluation and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Provider-assigned identifier, unique within its source and category.
    pub id: String,
    pub category: Category,
    /// The provider's own sub-type label (e.g. `COMPETITIVE`, `FRIENDLY`).
    pub provider_kind: String,
    pub name: String,
    pub club: Club,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub min_players: u32,
    pub max_players: u32,
    pub min_level: f64,
    pub max_level: f64,
    pub price: String,
    pub gender: String,
    pub available_places: u32,
    pub players: Vec<Player>,
    pub link: String,
}

/// A padel club.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
    pub address: Address,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

/// A player already registered on an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub link: String,
}
