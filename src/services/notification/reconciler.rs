use super::batcher;
use super::retry::{RetryPolicy, with_retry};
use crate::adapters::push::{PushError, PushProvider};
use crate::domain::{InvalidReason, PushErrorCode, Receipt, TicketMap};
use crate::error::{AppError, Result};
use crate::services::push_token_service::TokenStore;
use futures::future::try_join_all;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    receipts: Counter<u64>,
    invalidated_tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("obscura-push");
        Self {
            receipts: meter
                .u64_counter("push_receipts_total")
                .with_description("Total number of delivery receipts processed")
                .build(),
            invalidated_tokens: meter
                .u64_counter("push_invalidated_tokens_total")
                .with_description("Total number of push tokens invalidated")
                .build(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Receipts that matched a ticket of this call.
    pub checked: usize,
    pub invalidated: usize,
    /// Tickets whose receipt is not available yet.
    pub pending: usize,
    /// Tickets whose receipt lookup failed after retries.
    pub unresolved: usize,
    pub credential_failures: usize,
}

#[derive(Debug)]
pub struct ReceiptReconciler {
    provider: Arc<dyn PushProvider>,
    store: Arc<dyn TokenStore>,
    retry: RetryPolicy,
    chunk_size: usize,
    metrics: Metrics,
}

impl ReceiptReconciler {
    #[must_use]
    pub fn new(
        provider: Arc<dyn PushProvider>,
        store: Arc<dyn TokenStore>,
        retry: RetryPolicy,
        chunk_size: usize,
    ) -> Self {
        Self { provider, store, retry, chunk_size, metrics: Metrics::new() }
    }

    /// Fetches receipts for one chunk of ticket ids, retrying transient failures.
    ///
    /// # Errors
    /// Returns the provider error once it is terminal or attempts are exhausted.
    pub async fn fetch_receipts(
        &self,
        ticket_ids: &[String],
    ) -> std::result::Result<HashMap<String, Receipt>, PushError> {
        with_retry(&self.retry, "fetch_receipts", || self.provider.fetch_receipts(ticket_ids)).await
    }

    /// Fetches receipts for `ticket_ids` and invalidates endpoints the push service
    /// reports as permanently unregistered. Every other verdict leaves the endpoint alone.
    ///
    /// # Errors
    /// Returns `AppError::Configuration` if the push service rejects our credentials.
    #[tracing::instrument(level = "debug", skip_all, fields(tickets = ticket_ids.len()), err)]
    pub async fn reconcile(&self, ticket_ids: &[String], ticket_map: &TicketMap) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        if ticket_ids.is_empty() {
            return Ok(outcome);
        }

        let chunks = batcher::chunk(ticket_ids.to_vec(), self.chunk_size);
        let fetched = try_join_all(chunks.iter().map(|chunk| self.fetch_chunk(chunk))).await?;

        for (chunk, receipts) in chunks.iter().zip(fetched) {
            let Some(receipts) = receipts else {
                outcome.unresolved += chunk.len();
                continue;
            };
            outcome.pending += chunk.iter().filter(|id| !receipts.contains_key(id.as_str())).count();

            for (ticket_id, receipt) in receipts {
                self.apply_receipt(&ticket_id, receipt, ticket_map, &mut outcome).await;
            }
        }

        Ok(outcome)
    }

    async fn fetch_chunk(&self, chunk: &[String]) -> Result<Option<HashMap<String, Receipt>>> {
        match self.fetch_receipts(chunk).await {
            Ok(receipts) => Ok(Some(receipts)),
            Err(PushError::Configuration(msg)) => {
                tracing::error!(error = %msg, "Push service rejected credentials");
                Err(AppError::Configuration(msg))
            }
            Err(e) => {
                tracing::error!(error = %e, size = chunk.len(), "Failed to fetch push receipts");
                Ok(None)
            }
        }
    }

    async fn apply_receipt(
        &self,
        ticket_id: &str,
        receipt: Receipt,
        ticket_map: &TicketMap,
        outcome: &mut ReconcileOutcome,
    ) {
        let Some(token) = ticket_map.endpoint_for(ticket_id) else {
            return;
        };
        outcome.checked += 1;

        let failure = match receipt {
            Receipt::Ok => {
                self.metrics.receipts.add(1, &[KeyValue::new("status", "ok")]);
                return;
            }
            Receipt::Error(failure) => failure,
        };
        self.metrics.receipts.add(1, &[KeyValue::new("status", failure.code_label().to_string())]);

        match failure.code {
            Some(PushErrorCode::DeviceNotRegistered) => {
                tracing::info!(ticket_id, "Receipt reports device unregistered, invalidating token");
                if self.store.invalidate(token, InvalidReason::DeviceNotRegistered).await {
                    self.metrics
                        .invalidated_tokens
                        .add(1, &[KeyValue::new("reason", InvalidReason::DeviceNotRegistered.as_str())]);
                    outcome.invalidated += 1;
                }
            }
            // Account-level failure: the endpoint itself is fine.
            Some(PushErrorCode::InvalidCredentials) => {
                tracing::error!(ticket_id, detail = %failure.message, "Receipt reports invalid push credentials");
                outcome.credential_failures += 1;
            }
            _ => {
                tracing::warn!(
                    ticket_id,
                    code = failure.code_label(),
                    detail = %failure.message,
                    "Receipt reports delivery error"
                );
            }
        }
    }
}
