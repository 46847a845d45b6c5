//! Application configuration, loaded from environment variables.

use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Accepted API keys for the rules API.
    pub api_keys: Vec<String>,
    /// SQLite database URL.
    pub database_url: String,
    /// Offset applied when rescheduling a rule after evaluation.
    pub check_interval: Duration,
    pub smtp: SmtpConfig,
}

/// SMTP delivery settings. All fields optional: an unconfigured SMTP setup
/// disables email delivery rather than failing startup.
#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: Option<String>,
}

impl SmtpConfig {
    /// Whether enough settings are present to attempt delivery.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.username.is_some() && self.password.is_some()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PALERT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            api_keys: std::env::var("PALERT_API_KEYS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            database_url: std::env::var("PALERT_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://palert.db".to_string()),
            check_interval: Duration::from_secs(
                std::env::var("PALERT_CHECK_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            smtp: SmtpConfig {
                host: std::env::var("SMTP_SERVER").ok(),
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(587),
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
                sender: std::env::var("SMTP_SENDER").ok(),
            },
        }
    }
}
