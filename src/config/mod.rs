//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Scene/stage every participant is moved to once the lobby reaches consensus
pub const DEFAULT_TARGET_ACTIVITY: &str = "GameScene";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Target-activity identifier carried by the session transition event
    pub target_activity: String,
    /// Allowed client origins for CORS (empty = any)
    pub client_origins: Vec<String>,
    /// Seed for spawn placement, random when unset
    pub spawn_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let target_activity =
            lookup("TARGET_ACTIVITY").unwrap_or_else(|| DEFAULT_TARGET_ACTIVITY.to_string());
        if target_activity.trim().is_empty() {
            return Err(ConfigError::Invalid("TARGET_ACTIVITY"));
        }

        let spawn_seed = match lookup("SPAWN_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::Invalid("SPAWN_SEED"))?,
            ),
            None => None,
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            target_activity,
            client_origins,
            spawn_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            target_activity: DEFAULT_TARGET_ACTIVITY.to_string(),
            client_origins: Vec::new(),
            spawn_seed: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
