use crate::adapters::push::PushProvider;
use crate::config::PushConfig;
use crate::domain::{InvalidReason, OutboundMessage, PushPayload};
use crate::error::Result;
use crate::services::push_token_service::TokenStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub mod batcher;
pub mod dispatcher;
pub mod reconciler;
pub mod retry;
pub mod validator;

use dispatcher::Dispatcher;
use reconciler::ReceiptReconciler;
use retry::RetryPolicy;

/// Outcome of one delivery call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendReport {
    /// Messages accepted by the push service.
    pub sent: usize,
    /// Endpoints that went from valid to invalid during this call.
    pub cleaned: usize,
    /// Messages that were not accepted and did not lead to an invalidation.
    pub failed: usize,
    /// Accepted messages whose receipt was not available yet.
    pub pending: usize,
}

/// Entry point for push delivery: fan-out, submission and receipt reconciliation.
///
/// Each call keeps its own ticket correlation state, so concurrent calls never
/// share anything beyond the token store.
#[derive(Debug)]
pub struct DeliveryCoordinator {
    store: Arc<dyn TokenStore>,
    dispatcher: Dispatcher,
    reconciler: ReceiptReconciler,
}

impl DeliveryCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, provider: Arc<dyn PushProvider>, config: &PushConfig) -> Self {
        let retry = RetryPolicy::from_config(config);
        let dispatcher = Dispatcher::new(Arc::clone(&provider), Arc::clone(&store), retry, config.send_chunk_size);
        let reconciler = ReceiptReconciler::new(provider, Arc::clone(&store), retry, config.receipt_chunk_size);
        Self { store, dispatcher, reconciler }
    }

    /// Sends `payload` to every valid endpoint of a user.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the user's endpoints cannot be read, or
    /// `AppError::Configuration` if the push service rejects our credentials.
    #[tracing::instrument(err, skip(self, payload), fields(user_id = %user_id))]
    pub async fn send_to_user(&self, user_id: Uuid, payload: PushPayload) -> Result<SendReport> {
        let endpoints = self.store.fetch_active_endpoints(user_id).await?;
        if endpoints.is_empty() {
            tracing::debug!("No active push endpoints for user");
            return Ok(SendReport::default());
        }

        let tokens = endpoints.into_iter().map(|endpoint| endpoint.token).collect();
        self.deliver(tokens, payload).await
    }

    /// Sends `payload` to an explicit list of tokens. Duplicates are sent once.
    ///
    /// # Errors
    /// Returns `AppError::Configuration` if the push service rejects our credentials.
    #[tracing::instrument(err, skip_all, fields(tokens = tokens.len()))]
    pub async fn send_to_tokens(&self, tokens: Vec<String>, payload: PushPayload) -> Result<SendReport> {
        let mut seen = HashSet::with_capacity(tokens.len());
        let tokens = tokens.into_iter().filter(|token| seen.insert(token.clone())).collect();
        self.deliver(tokens, payload).await
    }

    async fn deliver(&self, tokens: Vec<String>, payload: PushPayload) -> Result<SendReport> {
        let mut report = SendReport::default();

        let (valid, malformed) = validator::partition(tokens);
        for token in &malformed {
            if self.store.invalidate(token, InvalidReason::MalformedToken).await {
                report.cleaned += 1;
            }
        }
        if !malformed.is_empty() {
            tracing::info!(count = malformed.len(), cleaned = report.cleaned, "Skipped malformed push tokens");
        }

        if valid.is_empty() {
            return Ok(report);
        }

        let payload = Arc::new(payload);
        let messages = valid.into_iter().map(|token| OutboundMessage::new(token, Arc::clone(&payload))).collect();

        let dispatched = self.dispatcher.dispatch(messages).await?;
        report.sent = dispatched.sent;
        report.failed = dispatched.failed;
        report.cleaned += dispatched.invalidated;

        let ticket_ids = dispatched.tickets.ticket_ids();
        let reconciled = self.reconciler.reconcile(&ticket_ids, &dispatched.tickets).await?;
        report.cleaned += reconciled.invalidated;
        report.pending = reconciled.pending + reconciled.unresolved;

        tracing::info!(
            sent = report.sent,
            cleaned = report.cleaned,
            failed = report.failed,
            pending = report.pending,
            "Push delivery finished"
        );
        Ok(report)
    }
}
