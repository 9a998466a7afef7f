// Domain error types - Secure error handling with no information disclosure

use thiserror::Error;

/// Main error type for the platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Malformed or out-of-range input (HTTP 400)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing or invalid credentials (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity does not exist or is not visible to the caller (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// State conflict such as duplicates or finished games (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Wallet balance too low for the requested debit (HTTP 409)
    #[error("Insufficient points: required {required}, available {available}")]
    InsufficientPoints { required: i64, available: i64 },

    /// Account is temporarily locked (HTTP 423)
    #[error("Account locked")]
    Locked,

    /// Daily quota exhausted (HTTP 429)
    #[error("Limit reached: {0}")]
    LimitReached(String),

    /// Storage backend failure (HTTP 500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Hashing or token signing failure (HTTP 500)
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl GameError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GameError::Validation(_) => 400,
            GameError::Unauthorized(_) => 401,
            GameError::Forbidden(_) => 403,
            GameError::NotFound(_) => 404,
            GameError::Conflict(_) => 409,
            GameError::InsufficientPoints { .. } => 409,
            GameError::Locked => 423,
            GameError::LimitReached(_) => 429,
            GameError::Storage(_) => 500,
            GameError::Configuration(_) => 500,
            GameError::Crypto(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            GameError::Validation(msg)
            | GameError::Unauthorized(msg)
            | GameError::Forbidden(msg)
            | GameError::Conflict(msg)
            | GameError::LimitReached(msg) => msg.clone(),
            GameError::NotFound(what) => format!("{} not found", what),
            GameError::InsufficientPoints { .. } => "Insufficient points".to_string(),
            GameError::Locked => "Account is locked, try again later".to_string(),
            GameError::Storage(_) | GameError::Configuration(_) | GameError::Crypto(_) => {
                "Internal error".to_string()
            }
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GameError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GameError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        GameError::Forbidden(msg.into())
    }
}

pub type GameResult<T> = Result<T, GameError>;
