//! Notification delivery: the [`Notifier`] contract and the SMTP email
//! channel.

use async_trait::async_trait;
use thiserror::Error;

use palert_core::{Activity, Rule, User};

pub mod email;

pub use email::EmailNotifier;

pub const CRATE_NAME: &str = "palert-notify";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A channel that can tell a rule owner about newly matched activities.
///
/// Delivery failures are reported, never retried here; the engine's next
/// evaluation cycle is the retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_activities(
        &self,
        user: &User,
        rule: &Rule,
        activities: &[Activity],
    ) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g. "email").
    fn channel_name(&self) -> &str;
}
