pub mod expo;

use crate::domain::{OutboundMessage, Receipt, Ticket};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub use expo::ExpoPushProvider;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Push service unavailable: {0}")]
    Unavailable(String),
    #[error("Push service rejected credentials: {0}")]
    Configuration(String),
    #[error("Push service rejected request: {0}")]
    Rejected(String),
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PushError {
    /// Rate limiting and server-side failures are worth another attempt; nothing else is.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable(_))
    }

    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::Configuration(_) => "configuration",
            Self::Rejected(_) => "rejected",
            Self::Other(_) => "other",
        }
    }
}

#[async_trait]
pub trait PushProvider: Send + Sync + std::fmt::Debug {
    /// Submits a batch of messages.
    ///
    /// The returned tickets are in the same order as `messages`; callers correlate
    /// tickets to endpoints by position.
    ///
    /// # Errors
    /// Returns a retriable `PushError` for rate limiting or transient outages and a
    /// terminal one for anything else.
    async fn submit(&self, messages: &[OutboundMessage]) -> Result<Vec<Ticket>, PushError>;

    /// Looks up delivery receipts for previously accepted tickets.
    /// Receipts that are not available yet are simply absent from the map.
    ///
    /// # Errors
    /// Same classification as [`PushProvider::submit`].
    async fn fetch_receipts(&self, ticket_ids: &[String]) -> Result<HashMap<String, Receipt>, PushError>;
}
