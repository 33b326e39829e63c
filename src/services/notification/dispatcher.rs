use super::batcher;
use super::retry::{RetryPolicy, with_retry};
use crate::adapters::push::{PushError, PushProvider};
use crate::domain::{InvalidReason, OutboundMessage, PushErrorCode, Ticket, TicketMap};
use crate::error::{AppError, Result};
use crate::services::push_token_service::TokenStore;
use futures::future::try_join_all;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
    invalidated_tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("obscura-push");
        Self {
            sent: meter
                .u64_counter("push_sent_total")
                .with_description("Total number of push messages accepted by the push service")
                .build(),
            errors: meter
                .u64_counter("push_errors_total")
                .with_description("Total number of push messages that could not be submitted")
                .build(),
            invalidated_tokens: meter
                .u64_counter("push_invalidated_tokens_total")
                .with_description("Total number of push tokens invalidated")
                .build(),
        }
    }
}

/// Result of submitting every chunk of one send call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Accepted ticket ids and the endpoint each one was issued for.
    pub tickets: TicketMap,
    pub sent: usize,
    pub failed: usize,
    pub invalidated: usize,
}

impl DispatchOutcome {
    fn merge(&mut self, other: Self) {
        self.tickets.extend(other.tickets);
        self.sent += other.sent;
        self.failed += other.failed;
        self.invalidated += other.invalidated;
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    provider: Arc<dyn PushProvider>,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    chunk_size: usize,
    metrics: Metrics,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        provider: Arc<dyn PushProvider>,
        store: Arc<dyn TokenStore>,
        retry: RetryPolicy,
        chunk_size: usize,
    ) -> Self {
        Self { provider, store, retry, chunk_size, metrics: Metrics::new() }
    }

    /// Submits one chunk, retrying transient failures.
    ///
    /// # Errors
    /// Returns the provider error once it is terminal or attempts are exhausted.
    pub async fn send_chunk(&self, chunk: &[OutboundMessage]) -> std::result::Result<Vec<Ticket>, PushError> {
        with_retry(&self.retry, "submit", || self.provider.submit(chunk)).await
    }

    /// Batches `messages`, submits all chunks concurrently and folds the tickets.
    ///
    /// A chunk that fails terminally or after retries is counted as failed without
    /// affecting its siblings.
    ///
    /// # Errors
    /// Returns `AppError::Configuration` if the push service rejects our credentials.
    #[tracing::instrument(level = "debug", skip_all, fields(messages = messages.len()), err)]
    pub async fn dispatch(&self, messages: Vec<OutboundMessage>) -> Result<DispatchOutcome> {
        let chunks = batcher::chunk(messages, self.chunk_size);
        let partials =
            try_join_all(chunks.iter().enumerate().map(|(index, chunk)| self.dispatch_chunk(index, chunk))).await?;

        let mut outcome = DispatchOutcome::default();
        for partial in partials {
            outcome.merge(partial);
        }
        Ok(outcome)
    }

    async fn dispatch_chunk(&self, index: usize, chunk: &[OutboundMessage]) -> Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        let tickets = match self.send_chunk(chunk).await {
            Ok(tickets) => tickets,
            Err(PushError::Configuration(msg)) => {
                tracing::error!(error = %msg, "Push service rejected credentials");
                return Err(AppError::Configuration(msg));
            }
            Err(e) => {
                tracing::error!(error = %e, chunk = index, size = chunk.len(), "Failed to submit push chunk");
                self.metrics.errors.add(chunk.len() as u64, &[KeyValue::new("reason", e.reason())]);
                outcome.failed = chunk.len();
                return Ok(outcome);
            }
        };

        if tickets.len() != chunk.len() {
            tracing::warn!(
                chunk = index,
                expected = chunk.len(),
                received = tickets.len(),
                "Ticket count does not match submitted messages"
            );
        }

        let matched = tickets.len().min(chunk.len());
        // Tickets come back in request order; position is the only correlation.
        for (message, ticket) in chunk.iter().zip(tickets) {
            self.apply_ticket(message, ticket, &mut outcome).await;
        }
        outcome.failed += chunk.len() - matched;

        Ok(outcome)
    }

    async fn apply_ticket(&self, message: &OutboundMessage, ticket: Ticket, outcome: &mut DispatchOutcome) {
        match ticket {
            Ticket::Accepted { id } => {
                tracing::debug!(token = %message.token, ticket_id = %id, "Push message accepted");
                self.metrics.sent.add(1, &[]);
                outcome.tickets.insert(id, message.token.clone());
                outcome.sent += 1;
            }
            Ticket::Rejected(failure) => {
                self.metrics.errors.add(1, &[KeyValue::new("reason", failure.code_label().to_string())]);
                match failure.code {
                    Some(PushErrorCode::DeviceNotRegistered) => {
                        tracing::info!("Token unregistered at submission, invalidating");
                        if self.store.invalidate(&message.token, InvalidReason::DeviceNotRegistered).await {
                            self.metrics
                                .invalidated_tokens
                                .add(1, &[KeyValue::new("reason", InvalidReason::DeviceNotRegistered.as_str())]);
                            outcome.invalidated += 1;
                        }
                    }
                    Some(PushErrorCode::InvalidCredentials) => {
                        tracing::error!(detail = %failure.message, "Push service reported invalid credentials");
                        outcome.failed += 1;
                    }
                    _ => {
                        tracing::warn!(
                            code = failure.code_label(),
                            detail = %failure.message,
                            "Push message rejected at submission"
                        );
                        outcome.failed += 1;
                    }
                }
            }
        }
    }
}
