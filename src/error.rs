use thiserror::Error;

/// Errors that abort a delivery call.
///
/// Per-endpoint and per-chunk failures never surface here; they are absorbed
/// into the send report.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Push provider configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
