use crate::email::EmailSettings;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_file: String,
    pub bind_addr: SocketAddr,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub email: EmailSettings,
    pub permissions_file: Option<PathBuf>,
}

impl Settings {
    // Variables d'environnement ; le `.env` éventuel est chargé par `main` avant l'appel.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let bind_addr = parse("BIND_ADDR", get("BIND_ADDR", "0.0.0.0:5000"))?;
        let smtp_port = parse("SMTP_PORT", get("SMTP_PORT", "25"))?;

        let sender_address = get("EMAIL_SENDER", "webmaster@localhost");
        let reply_to = get("EMAIL_REPLY_TO", &sender_address);

        Ok(Self {
            database_file: get("DATABASE_FILE", ":memory:"),
            bind_addr,
            smtp_host: get("SMTP_HOST", "localhost"),
            smtp_port,
            email: EmailSettings {
                sender_address,
                sender_name: get("EMAIL_SENDER_NAME", ""),
                reply_to,
                developer_addresses: get("DEVELOPER_EMAILS", "")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                registration_page_url: get("REGISTRATION_PAGE_URL", ""),
                password_reset_page_url: get("PASSWORD_RESET_PAGE_URL", ""),
            },
            permissions_file: lookup("PERMISSIONS_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
