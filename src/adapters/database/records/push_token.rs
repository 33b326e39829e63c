use crate::domain::{Endpoint, InvalidReason};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct PushTokenRecord {
    pub(crate) token: String,
    pub(crate) user_id: Uuid,
    pub(crate) device_id: String,
    pub(crate) platform: String,
    pub(crate) is_valid: bool,
    pub(crate) invalid_reason: Option<String>,
    pub(crate) invalidated_at: Option<OffsetDateTime>,
}

impl TryFrom<PushTokenRecord> for Endpoint {
    type Error = AppError;

    fn try_from(record: PushTokenRecord) -> Result<Self, Self::Error> {
        let platform = record.platform.parse().map_err(AppError::Internal)?;
        Ok(Self {
            token: record.token,
            user_id: record.user_id,
            device_id: record.device_id,
            platform,
            is_valid: record.is_valid,
            invalid_reason: record.invalid_reason.as_deref().map(InvalidReason::parse),
            invalidated_at: record.invalidated_at,
        })
    }
}
