//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `ADAPTIVE_LIMITER` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use adaptive_limiter::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Admin API on {:?}", config.server.socket_addr());
//! ```

mod error;
mod limiter;
mod redis;
mod server;

pub use self::error::{ConfigError, ValidationError};
pub use self::limiter::EngineConfig;
pub use self::redis::RedisConfig;
pub use self::server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Admin server configuration (host, port, environment, log filter)
    #[serde(default)]
    pub server: ServerConfig,

    /// Counting store connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// Rate limit engine tunables
    #[serde(default)]
    pub limiter: EngineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `ADAPTIVE_LIMITER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `ADAPTIVE_LIMITER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ADAPTIVE_LIMITER__LIMITER__BYPASS=true` -> `limiter.bypass = true`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ADAPTIVE_LIMITER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.limiter.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
