//! Server configuration parsed from environment variables.

use crate::connection::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
    Test,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT '{0}' (expected 1-65535)")]
    InvalidPort(String),
    #[error("invalid APP_ENV '{0}' (expected development, production, or test)")]
    InvalidMode(String),
    #[error("invalid {key} '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub mode: Mode,
    /// Outbound queue depth per connection.
    pub queue_capacity: usize,
    /// Fan each echo out to every other open session.
    pub broadcast_echo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, mode: Mode::Development, queue_capacity: DEFAULT_QUEUE_CAPACITY, broadcast_echo: false }
    }
}

impl ServerConfig {
    /// Build typed config from the process environment.
    ///
    /// Optional:
    /// - `PORT`: default 5000, falling back to `FLASK_PORT`
    /// - `APP_ENV`: `development` (default), `production`, or `test`,
    ///   falling back to `FLASK_ENV`
    /// - `OUTBOUND_QUEUE_CAPACITY`: default 256, at least 1
    /// - `BROADCAST_ECHO`: `true`/`false`/`1`/`0`, default false
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for any value that is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for any value that is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_port(lookup("PORT").or_else(|| lookup("FLASK_PORT")).as_deref())?;
        let mode = parse_mode(lookup("APP_ENV").or_else(|| lookup("FLASK_ENV")).as_deref())?;
        let queue_capacity = parse_capacity(lookup("OUTBOUND_QUEUE_CAPACITY").as_deref())?;
        let broadcast_echo = parse_flag("BROADCAST_ECHO", lookup("BROADCAST_ECHO").as_deref())?;

        Ok(Self { port, mode, queue_capacity, broadcast_echo })
    }
}

fn parse_port(raw: Option<&str>) -> Result<u16, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_PORT);
    };
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}

fn parse_mode(raw: Option<&str>) -> Result<Mode, ConfigError> {
    match raw.map(str::trim).unwrap_or("development") {
        "development" => Ok(Mode::Development),
        "production" => Ok(Mode::Production),
        "test" => Ok(Mode::Test),
        other => Err(ConfigError::InvalidMode(other.to_string())),
    }
}

fn parse_capacity(raw: Option<&str>) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_QUEUE_CAPACITY);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidValue { key: "OUTBOUND_QUEUE_CAPACITY", value: raw.to_string() }),
    }
}

fn parse_flag(key: &'static str, raw: Option<&str>) -> Result<bool, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue { key, value: other.to_string() }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
