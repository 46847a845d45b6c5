//! Typed HTTP bindings for the Playtomic activity catalog.
//!
//! One endpoint per activity category (`/matches`, `/classes`, `/lessons`),
//! each parameterized by club scope, status/visibility constants and a
//! "from" date floor. Responses are decoded into the wire models in
//! [`models`]; callers transform those into domain activities.

use chrono::{DateTime, NaiveDateTime, Utc};

pub mod client;
pub mod models;
pub mod params;

pub use client::{PlaytomicClient, ProviderError};
pub use params::{SearchClassesParams, SearchLessonsParams, SearchMatchesParams};

pub const CRATE_NAME: &str = "palert-playtomic";

/// The provider's timestamp layout: local naive time, no zone designator.
const PROVIDER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a provider timestamp, treating it as UTC.
pub fn parse_provider_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, PROVIDER_TIME_FORMAT).map(|dt| dt.and_utc())
}

/// Midnight-today date floor in the provider's timestamp layout.
pub fn from_today_floor(now: DateTime<Utc>) -> String {
    format!("{}T00:00:00", now.format("%Y-%m-%d"))
}
