use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// SMTP submission settings. Credentials always come from the environment.
#[derive(Clone)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub mail: MailSettings,
    pub stylesheet_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are dropped
    pub session_idle_minutes: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let username = require("SMTP_USERNAME")?;
        let mail = MailSettings {
            smtp_host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
            password: require("SMTP_PASSWORD")?,
            from: get("MAIL_FROM").unwrap_or_else(|| username.clone()),
            to: require("MAIL_TO")?,
            username,
        };

        let max_upload_mb: usize = parse_or("MAX_UPLOAD_MB", get("MAX_UPLOAD_MB"), 25)?;

        Ok(Self {
            port: parse_or("PORT", get("PORT"), 3000)?,
            mail,
            stylesheet_path: get("STYLESHEET_PATH").map(PathBuf::from),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            session_idle_minutes: parse_or(
                "SESSION_IDLE_MINUTES",
                get("SESSION_IDLE_MINUTES"),
                30,
            )?,
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("SMTP_USERNAME", "sender@example.com"),
        ("SMTP_PASSWORD", "secret"),
        ("MAIL_TO", "documents@example.com"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_are_absent() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.mail.smtp_host, "smtp.gmail.com");
        assert_eq!(config.mail.smtp_port, 587);
        assert_eq!(config.mail.from, "sender@example.com");
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert!(config.stylesheet_path.is_none());
        assert_eq!(config.session_idle_minutes, 30);
    }

    #[test]
    fn credentials_are_required() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "sender@example.com"),
            ("MAIL_TO", "documents@example.com"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("SMTP_PASSWORD"));

        let err = AppConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "sender@example.com"),
            ("SMTP_PASSWORD", "  "),
            ("MAIL_TO", "documents@example.com"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("SMTP_PASSWORD"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SMTP_PORT", "submission"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SMTP_PORT", .. }));
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
