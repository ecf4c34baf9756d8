//! Akuflow error type.

use thiserror::Error;

/// Errors raised across the Akuflow crates.
#[derive(Debug, Error)]
pub enum AkuflowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Auth failed: {0}")]
    Auth(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AkuflowError {
    /// Short machine-readable category, used in log fields and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Mail(_) => "mail",
            Self::Auth(_) => "auth",
            Self::Template(_) => "template",
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, AkuflowError>;
