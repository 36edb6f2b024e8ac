//! Server configuration.
//!
//! Every field has a default, and a partially written configuration keeps
//! the caller's values: only omitted fields fall back to the defaults.
//!
//! ```toml
//! port = 17091
//! base_session_id = 1
//! max_sessions = 1024
//! idle = "yield"            # or: idle = { sleep_ms = 1 }
//!
//! [http]
//! enabled = true
//! bind_ip = "127.0.0.1"
//! bind_port = 17091
//! ```

use crate::error::ConfigError;
use peerlink_core::SessionId;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default engine port.
pub const DEFAULT_PORT: u16 = 17091;
/// Default live-session capacity.
pub const DEFAULT_MAX_SESSIONS: usize = 4096;

/// What the poll loop does after a poll that produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleStrategy {
    /// Hand control back to the scheduler and poll again right away.
    #[default]
    Yield,
    /// Sleep this many milliseconds before polling again.
    SleepMs(u64),
}

impl IdleStrategy {
    /// Returns the sleep between empty polls, if any.
    #[must_use]
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Yield => None,
            Self::SleepMs(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

/// Auxiliary HTTP status listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the listener runs.
    pub enabled: bool,
    /// Address to bind to.
    pub bind_ip: IpAddr,
    /// Port to bind to.
    pub bind_port: u16,
}

impl HttpConfig {
    /// Returns the socket address the listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.bind_port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_port: DEFAULT_PORT,
        }
    }
}

/// Startup configuration, frozen once the server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Port the engine listens on.
    pub port: u16,
    /// First session ID the engine hands out.
    pub base_session_id: SessionId,
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Behaviour after an empty poll.
    pub idle: IdleStrategy,
    /// Auxiliary HTTP listener.
    pub http: HttpConfig,
}

impl ServerConfig {
    /// Parses a TOML configuration.
    ///
    /// # Errors
    /// Returns an error if the text is not valid TOML, names unknown fields
    /// or holds out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::invalid("max_sessions must be at least 1"));
        }
        let id_space = u64::from(SessionId::MAX - self.base_session_id) + 1;
        if self.max_sessions as u64 > id_space {
            return Err(ConfigError::invalid(format!(
                "max_sessions {} exceeds the {} ids above base {}",
                self.max_sessions, id_space, self.base_session_id
            )));
        }
        if self.idle == IdleStrategy::SleepMs(0) {
            return Err(ConfigError::invalid(
                "idle sleep_ms must be at least 1; use \"yield\" to poll without sleeping",
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_session_id: 0,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle: IdleStrategy::Yield,
            http: HttpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 17091);
        assert_eq!(config.base_session_id, 0);
        assert_eq!(config.idle, IdleStrategy::Yield);
        assert!(!config.http.enabled);
        assert_eq!(config.http.bind_addr(), "127.0.0.1:17091".parse().unwrap());
    }

    #[test]
    fn test_empty_text_is_default() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_given_fields() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 9000

            [http]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert!(config.http.enabled);
        assert_eq!(config.http.bind_port, 17091);
        assert_eq!(config.http.bind_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_idle_strategy() {
        let config = ServerConfig::from_toml_str("idle = { sleep_ms = 5 }").unwrap();
        assert_eq!(config.idle, IdleStrategy::SleepMs(5));
        assert_eq!(config.idle.delay(), Some(Duration::from_millis(5)));

        let config = ServerConfig::from_toml_str(r#"idle = "yield""#).unwrap();
        assert_eq!(config.idle.delay(), None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ServerConfig::from_toml_str("prot = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ServerConfig::from_toml_str("max_sessions = 0");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_sleep_rejected() {
        let result = ServerConfig::from_toml_str("idle = { sleep_ms = 0 }");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert!(ServerConfig::from_toml_str("idle = { sleep_ms = 1 }").is_ok());
    }

    #[test]
    fn test_capacity_beyond_id_space_rejected() {
        let config = ServerConfig {
            base_session_id: SessionId::MAX - 1,
            max_sessions: 3,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 4000\nbase_session_id = 10").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.base_session_id, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ServerConfig::load("/nonexistent/peerlink.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
