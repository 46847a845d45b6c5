//! SMTP email notifier via `lettre`, rendering an askama HTML body.
//!
//! An unconfigured SMTP setup disables delivery: notifications are skipped
//! with a warning instead of erroring, so the engine keeps evaluating rules
//! on hosts without mail credentials.

use askama::Template;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use palert_core::config::SmtpConfig;
use palert_core::{Activity, Rule, User};

use crate::{Notifier, NotifyError};

/// Sends activity alerts as HTML emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Option<Mailbox>,
}

impl EmailNotifier {
    /// Build a notifier from SMTP configuration. Missing host or credentials
    /// produce a disabled notifier rather than an error.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let (Some(host), Some(username), Some(password)) =
            (&config.host, &config.username, &config.password)
        else {
            return Ok(Self {
                transport: None,
                sender: None,
            });
        };

        let sender_raw = config.sender.as_deref().unwrap_or(username);
        let sender: Mailbox = sender_raw
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotifyError::Config(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();

        Ok(Self {
            transport: Some(transport),
            sender: Some(sender),
        })
    }

    /// Whether this notifier will actually deliver anything.
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_new_activities(
        &self,
        user: &User,
        rule: &Rule,
        activities: &[Activity],
    ) -> Result<(), NotifyError> {
        if activities.is_empty() {
            return Ok(());
        }

        let (Some(transport), Some(sender)) = (&self.transport, &self.sender) else {
            warn!(user_id = %user.id, "SMTP not configured; skipping email notification");
            return Ok(());
        };

        let to: Mailbox = user
            .email
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let subject = format!("PadelAlert: {} new activities available", activities.len());
        let body = render_activity_email(rule, activities)?;

        let email = Message::builder()
            .from(sender.clone())
            .to(to)
            .subject(&subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!(
            user_id = %user.id,
            rule_id = %rule.id,
            activities = activities.len(),
            "email notification sent"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

#[derive(Template)]
#[template(path = "activity_email.html")]
struct ActivityEmailTemplate<'a> {
    rule_name: &'a str,
    count: usize,
    activities: Vec<ActivityRow>,
}

struct ActivityRow {
    name: String,
    link: String,
    club_name: String,
    club_link: String,
    date: String,
    time_range: String,
    duration: String,
    level_range: String,
    available_places: u32,
    price: String,
}

fn render_activity_email(rule: &Rule, activities: &[Activity]) -> Result<String, NotifyError> {
    let template = ActivityEmailTemplate {
        rule_name: &rule.name,
        count: activities.len(),
        activities: activities.iter().map(activity_row).collect(),
    };
    template
        .render()
        .map_err(|e| NotifyError::Template(e.to_string()))
}

fn activity_row(activity: &Activity) -> ActivityRow {
    ActivityRow {
        name: activity.name.clone(),
        link: activity.link.clone(),
        club_name: activity.club.name.clone(),
        club_link: activity.club.link.clone(),
        date: activity.starts_at.format("%Y-%m-%d").to_string(),
        time_range: format!(
            "{} - {}",
            activity.starts_at.format("%H:%M"),
            activity.ends_at.format("%H:%M")
        ),
        duration: format_duration(activity.duration_minutes),
        level_range: format_level_range(activity.min_level, activity.max_level),
        available_places: activity.available_places,
        price: activity.price.clone(),
    }
}

fn format_duration(minutes: i64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

fn format_level_range(min: f64, max: f64) -> String {
    if min == 0.0 && max == 0.0 {
        "Any".to_string()
    } else {
        format!("{min:.1} - {max:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use palert_core::{Address, Category, Club};
    use uuid::Uuid;

    fn sample_rule() -> Rule {
        let now = Utc::now();
        Rule {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "weekend matches".into(),
            category: Some(Category::Match),
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

    fn sample_activity(name: &str, min_level: f64, max_level: f64) -> Activity {
        let starts_at = Utc.with_ymd_and_hms(2026, 8, 9, 18, 0, 0).unwrap();
        Activity {
            id: format!("a-{name}"),
            category: Category::Match,
            provider_kind: "COMPETITIVE".into(),
            name: name.into(),
            club: Club {
                id: "club-1".into(),
                name: "Central Padel".into(),
                address: Address::default(),
                link: "https://app.playtomic.io/tenant/club-1".into(),
            },
            starts_at,
            ends_at: starts_at + Duration::minutes(90),
            duration_minutes: 90,
            min_players: 4,
            max_players: 4,
            min_level,
            max_level,
            price: "14 EUR".into(),
            gender: "MIXED".into(),
            available_places: 2,
            players: vec![],
            link: "https://app.playtomic.io/match/a-1".into(),
        }
    }

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "player@example.com".into(),
            name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn email_body_lists_activities() {
        let rule = sample_rule();
        let activities = vec![
            sample_activity("Evening Match", 3.0, 4.0),
            sample_activity("Open Play", 0.0, 0.0),
        ];

        let html = render_activity_email(&rule, &activities).unwrap();
        assert!(html.contains("weekend matches"));
        assert!(html.contains("Evening Match"));
        assert!(html.contains("Central Padel"));
        assert!(html.contains("3.0 - 4.0"));
        assert!(html.contains("Any"));
        assert!(html.contains("18:00 - 19:30"));
        assert!(html.contains("1h 30m"));
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(60), "1h");
        assert_eq!(format_duration(90), "1h 30m");
    }

    #[test]
    fn unconfigured_smtp_yields_a_disabled_notifier() {
        let notifier = EmailNotifier::from_config(&SmtpConfig::default()).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn disabled_notifier_skips_delivery_without_error() {
        let notifier = EmailNotifier::from_config(&SmtpConfig::default()).unwrap();
        let result = notifier
            .notify_new_activities(
                &sample_user(),
                &sample_rule(),
                &[sample_activity("Evening Match", 3.0, 4.0)],
            )
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn invalid_sender_address_is_a_config_error() {
        let config = SmtpConfig {
            host: Some("smtp.example.com".into()),
            port: 587,
            username: Some("alerts".into()),
            password: Some("secret".into()),
            sender: Some("not-an-address".into()),
        };
        let err = EmailNotifier::from_config(&config).unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn valid_config_builds_an_enabled_notifier() {
        let config = SmtpConfig {
            host: Some("smtp.example.com".into()),
            port: 587,
            username: Some("alerts".into()),
            password: Some("secret".into()),
            sender: Some("PadelAlert <alerts@example.com>".into()),
        };
        let notifier = EmailNotifier::from_config(&config).unwrap();
        assert!(notifier.is_enabled());
        assert_eq!(notifier.channel_name(), "email");
    }
}
