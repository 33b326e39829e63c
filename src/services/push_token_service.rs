use crate::adapters::database::DbPool;
use crate::adapters::database::push_token_repo::PushTokenRepository;
use crate::domain::{Endpoint, InvalidReason, Platform};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence seam for push endpoints.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Returns the valid endpoints of a user. An empty list is not an error.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    async fn fetch_active_endpoints(&self, user_id: Uuid) -> Result<Vec<Endpoint>>;

    /// Marks `token` invalid with `reason` and returns whether a valid endpoint
    /// was flipped.
    ///
    /// Invalidating an unknown or already-invalid token is a no-op returning
    /// `false`. Storage failures are logged and also reported as `false`.
    async fn invalidate(&self, token: &str, reason: InvalidReason) -> bool;
}

#[derive(Clone, Debug)]
pub struct PushTokenService {
    pool: DbPool,
    repo: PushTokenRepository,
}

impl PushTokenService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: PushTokenRepository) -> Self {
        Self { pool, repo }
    }

    /// Registers or revives a push token for a device.
    /// Any other valid token previously registered for the same device is superseded.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the transaction fails.
    #[tracing::instrument(err, skip(self, token), fields(user_id = %user_id, platform = %platform))]
    pub async fn register_token(&self, user_id: Uuid, device_id: &str, platform: Platform, token: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let superseded = self.repo.supersede_device_tokens(&mut tx, user_id, device_id, token).await?;
        self.repo.upsert_token(&mut tx, user_id, device_id, platform, token).await?;
        tx.commit().await?;

        if superseded > 0 {
            tracing::info!(superseded, "Superseded previous push tokens for device");
        }
        Ok(())
    }

    /// Looks up a single endpoint, valid or not.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    pub async fn find_endpoint(&self, token: &str) -> Result<Option<Endpoint>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find_by_token(&mut conn, token).await
    }
}

#[async_trait]
impl TokenStore for PushTokenService {
    #[tracing::instrument(err, skip(self), fields(user_id = %user_id))]
    async fn fetch_active_endpoints(&self, user_id: Uuid) -> Result<Vec<Endpoint>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find_active_for_user(&mut conn, user_id).await
    }

    #[tracing::instrument(skip(self, token), fields(reason = %reason))]
    async fn invalidate(&self, token: &str, reason: InvalidReason) -> bool {
        let result = match self.pool.acquire().await {
            Ok(mut conn) => self.repo.invalidate(&mut conn, token, reason).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(true) => {
                tracing::info!("Push token invalidated");
                true
            }
            Ok(false) => {
                tracing::debug!("Push token already invalid or unknown");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to invalidate push token");
                false
            }
        }
    }
}
