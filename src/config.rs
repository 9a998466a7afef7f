// Configuration management

use crate::core::errors::GameError;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
///
/// Without `DATABASE_URL` the service runs on the in-memory store.
/// All configuration is validated on load with clear error messages.
#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Database configuration (optional)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Seed data
    pub seed_yaml_path: Option<PathBuf>,

    // Token configuration
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,

    // Password hashing cost
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,

    // Middleware configuration
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,
    /// 0 disables rate limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,

    // Read cache
    pub cache_ttl_secs: u64,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Minimum accepted JWT secret length in bytes
    pub const MIN_JWT_SECRET_BYTES: usize = 32;

    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, GameError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // file may not exist
        }

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0")?,
            port: Self::parse_port()?,
            database_url: Self::get_optional_env("DATABASE_URL")?,
            database_max_connections: Self::parse_u32_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
            seed_yaml_path: Self::get_optional_env("SEED_YAML_PATH")?.map(PathBuf::from),
            jwt_secret: Self::get_required_secret("JWT_SECRET")?,
            jwt_issuer: Self::get_env_or_default("JWT_ISSUER", "gamespace")?,
            jwt_audience: Self::get_env_or_default("JWT_AUDIENCE", "gamespace")?,
            access_token_ttl_secs: Self::parse_u64_or_default("ACCESS_TOKEN_TTL_SECS", 24 * 3600)?,
            refresh_token_ttl_secs: Self::parse_u64_or_default("REFRESH_TOKEN_TTL_SECS", 30 * 24 * 3600)?,
            argon2_memory_kib: Self::parse_u32_or_default("ARGON2_MEMORY_KIB", 19 * 1024)?,
            argon2_iterations: Self::parse_u32_or_default("ARGON2_ITERATIONS", 2)?,
            request_timeout_secs: Self::parse_u64_or_default("REQUEST_TIMEOUT_SECS", 30)?,
            body_size_limit_bytes: Self::parse_usize_or_default("BODY_SIZE_LIMIT_BYTES", 1024 * 1024)?,
            rate_limit_per_second: Self::parse_u64_allow_zero("RATE_LIMIT_PER_SECOND", 10)?,
            rate_limit_burst: Self::parse_u32_or_default("RATE_LIMIT_BURST", 50)?,
            cache_ttl_secs: Self::parse_u64_or_default("CACHE_TTL_SECS", 30)?,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info")?,
            log_format: Self::get_env_or_default("LOG_FORMAT", "json")?,
        };

        config.validate()?;

        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> Result<String, GameError> {
        Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
    }

    fn get_optional_env(key: &str) -> Result<Option<String>, GameError> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn get_required_secret(key: &str) -> Result<SecretString, GameError> {
        let value = env::var(key)
            .map_err(|_| GameError::Configuration(format!("{} not set", key)))?;

        if value.is_empty() {
            return Err(GameError::Configuration(format!("{} is empty", key)));
        }

        Ok(SecretString::new(value))
    }

    /// Parse port from PORT environment variable
    fn parse_port() -> Result<u16, GameError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            GameError::Configuration(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(GameError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    fn parse_positive<T>(key: &str, value: &str) -> Result<T, GameError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        let parsed = value.parse::<T>().map_err(|e| {
            GameError::Configuration(format!("Invalid {} value '{}': {}", key, value, e))
        })?;

        if parsed == T::default() {
            return Err(GameError::Configuration(format!(
                "{} must be greater than 0",
                key
            )));
        }

        Ok(parsed)
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, GameError> {
        match env::var(key) {
            Ok(value) => Self::parse_positive(key, &value),
            _ => Ok(default),
        }
    }

    fn parse_u32_or_default(key: &str, default: u32) -> Result<u32, GameError> {
        match env::var(key) {
            Ok(value) => Self::parse_positive(key, &value),
            _ => Ok(default),
        }
    }

    fn parse_usize_or_default(key: &str, default: usize) -> Result<usize, GameError> {
        match env::var(key) {
            Ok(value) => Self::parse_positive(key, &value),
            _ => Ok(default),
        }
    }

    /// Like `parse_u64_or_default` but 0 is a meaningful value (feature off).
    fn parse_u64_allow_zero(key: &str, default: u64) -> Result<u64, GameError> {
        match env::var(key) {
            Ok(value) => value.parse::<u64>().map_err(|e| {
                GameError::Configuration(format!("Invalid {} value '{}': {}", key, value, e))
            }),
            _ => Ok(default),
        }
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), GameError> {
        if let Some(ref path) = self.seed_yaml_path {
            Self::validate_file_path(path, "Seed YAML file")?;
        }

        if let Some(ref url) = self.database_url {
            Self::validate_url(url, "Database URL")?;
        }

        if self.jwt_secret.expose_secret().len() < Self::MIN_JWT_SECRET_BYTES {
            return Err(GameError::Configuration(format!(
                "JWT_SECRET must be at least {} bytes",
                Self::MIN_JWT_SECRET_BYTES
            )));
        }

        // argon2 rejects memory below 8 KiB per lane
        if self.argon2_memory_kib < 8 {
            return Err(GameError::Configuration(
                "ARGON2_MEMORY_KIB must be at least 8".to_string(),
            ));
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    /// Validate that a file path exists and is readable
    fn validate_file_path(path: &PathBuf, description: &str) -> Result<(), GameError> {
        if !path.exists() {
            return Err(GameError::Configuration(format!(
                "{} not found at {:?}",
                description, path
            )));
        }

        if !path.is_file() {
            return Err(GameError::Configuration(format!(
                "{} is not a file: {:?}",
                description, path
            )));
        }

        std::fs::File::open(path).map_err(|e| {
            GameError::Configuration(format!("Cannot read {} at {:?}: {}", description, path, e))
        })?;

        Ok(())
    }

    fn validate_url(url: &str, description: &str) -> Result<(), GameError> {
        url::Url::parse(url).map_err(|e| {
            // never echo the URL, it may carry credentials
            GameError::Configuration(format!("Invalid {}: {}", description, e))
        })?;
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), GameError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(GameError::Configuration(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), GameError> {
        if format != "json" && format != "text" {
            return Err(GameError::Configuration(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }

    /// Whether the HTTP rate limiter should be installed
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_per_second > 0 && self.rate_limit_burst > 0
    }
}

impl Config {
    /// Create a test configuration
    ///
    /// Bypasses environment loading. Uses a cheap password hash and no rate
    /// limiting, since in-process requests carry no peer address.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            database_url: None,
            database_max_connections: 1,
            seed_yaml_path: None,
            jwt_secret: SecretString::new("test-secret-test-secret-test-secret!".to_string()),
            jwt_issuer: "gamespace".to_string(),
            jwt_audience: "gamespace".to_string(),
            access_token_ttl_secs: 24 * 3600,
            refresh_token_ttl_secs: 30 * 24 * 3600,
            argon2_memory_kib: 8,
            argon2_iterations: 1,
            request_timeout_secs: 30,
            body_size_limit_bytes: 1024 * 1024,
            rate_limit_per_second: 0,
            rate_limit_burst: 50,
            cache_ttl_secs: 30,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}
