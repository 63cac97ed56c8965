//! Library error type.
//!
//! Only problems that stop a run (bad configuration, unreadable files, a
//! corrupt checkpoint) are `AppError`s. Per-record lookup failures are values
//! carried by [`crate::core::models::LookupResult`] and never abort a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Output destination '{0}' is the same as the input source")]
    SameDestination(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Could not extract a domain: {0}")]
    DomainExtraction(String),
}

impl AppError {
    /// Errors that must abort a run before any paid call is made.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::SameDestination(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
