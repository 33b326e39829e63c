use crate::adapters::database::records::PushTokenRecord;
use crate::domain::{Endpoint, InvalidReason, Platform};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

const ENDPOINT_COLUMNS: &str = "token, user_id, device_id, platform, is_valid, invalid_reason, invalidated_at";

#[derive(Clone, Debug, Default)]
pub struct PushTokenRepository {}

impl PushTokenRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Finds all valid push tokens for a user, oldest registration first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn find_active_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Endpoint>> {
        let records = sqlx::query_as::<_, PushTokenRecord>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM push_tokens WHERE user_id = $1 AND is_valid ORDER BY created_at, token"
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(Endpoint::try_from).collect()
    }

    /// Looks up a single token regardless of validity.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, token), err)]
    pub async fn find_by_token(&self, conn: &mut PgConnection, token: &str) -> Result<Option<Endpoint>> {
        let record = sqlx::query_as::<_, PushTokenRecord>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM push_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(conn)
        .await?;

        record.map(Endpoint::try_from).transpose()
    }

    /// Marks a token invalid. Rows that are already invalid keep their original reason.
    /// Returns whether a row changed.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, token), err)]
    pub async fn invalidate(&self, conn: &mut PgConnection, token: &str, reason: InvalidReason) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE push_tokens
            SET is_valid = FALSE, invalid_reason = $2, invalidated_at = NOW(), updated_at = NOW()
            WHERE token = $1 AND is_valid
            ",
        )
        .bind(token)
        .bind(reason.as_str())
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Invalidates every other valid token registered for the same device.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, keep_token), err)]
    pub async fn supersede_device_tokens(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        device_id: &str,
        keep_token: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE push_tokens
            SET is_valid = FALSE, invalid_reason = $4, invalidated_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND device_id = $2 AND token <> $3 AND is_valid
            ",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(keep_token)
        .bind(InvalidReason::Other.as_str())
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Inserts a token, or revives and rebinds it if it already exists.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, token), err)]
    pub async fn upsert_token(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        device_id: &str,
        platform: Platform,
        token: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO push_tokens (token, user_id, device_id, platform)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                device_id = EXCLUDED.device_id,
                platform = EXCLUDED.platform,
                is_valid = TRUE,
                invalid_reason = NULL,
                invalidated_at = NULL,
                updated_at = NOW()
            ",
        )
        .bind(token)
        .bind(user_id)
        .bind(device_id)
        .bind(platform.as_str())
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
