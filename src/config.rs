use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::info;

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_DATABASE_URL: &str = "sqlite:firewatch.db?mode=rwc";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

const DEVELOPMENT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("expected development or production, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub environment: Environment,
    /// CORS origins allowed to send credentialed requests.
    pub allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            environment: Environment::Development,
            allowed_origins: DEVELOPMENT_ORIGINS.iter().map(|o| o.to_string()).collect(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment: Environment = try_load(&lookup, "FIREWATCH_ENV", Environment::Development)?;

        let allowed_origins = match lookup("FIREWATCH_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None if environment.is_production() => {
                info!("FIREWATCH_ALLOWED_ORIGINS not set, cross-origin requests disabled");
                Vec::new()
            }
            None => {
                info!("FIREWATCH_ALLOWED_ORIGINS not set, allowing local development origins");
                DEVELOPMENT_ORIGINS.iter().map(|o| o.to_string()).collect()
            }
        };

        Ok(Self {
            port: try_load(&lookup, "FIREWATCH_PORT", DEFAULT_PORT)?,
            database_url: try_load(&lookup, "FIREWATCH_DATABASE_URL", DEFAULT_DATABASE_URL.to_string())?,
            environment,
            allowed_origins,
            body_limit_bytes: try_load(&lookup, "FIREWATCH_BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES)?,
        })
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 9999);
        assert_eq!(config.body_limit_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("FIREWATCH_PORT", "8080"),
            ("FIREWATCH_DATABASE_URL", "sqlite::memory:"),
            ("FIREWATCH_ENV", "production"),
            ("FIREWATCH_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(config.environment.is_production());
        assert_eq!(config.allowed_origins, ["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_production_has_no_default_origins() {
        let config = load(&[("FIREWATCH_ENV", "production")]).unwrap();
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let err = load(&[("FIREWATCH_PORT", "ninety")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FIREWATCH_PORT", .. }));

        assert!(load(&[("FIREWATCH_ENV", "staging")]).is_err());
    }
}
