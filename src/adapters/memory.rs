use crate::domain::{Endpoint, InvalidReason, Platform};
use crate::error::Result;
use crate::services::push_token_service::TokenStore;
use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Process-local token store with the same semantics as the Postgres one.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    endpoints: DashMap<String, Endpoint>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or revives a token, superseding other valid tokens of the same device.
    pub fn register_token(&self, user_id: Uuid, device_id: &str, platform: Platform, token: &str) {
        let now = OffsetDateTime::now_utc();
        for mut entry in self.endpoints.iter_mut() {
            let endpoint = entry.value_mut();
            if endpoint.user_id == user_id && endpoint.device_id == device_id && endpoint.token != token {
                endpoint.invalidate(InvalidReason::Other, now);
            }
        }
        self.endpoints.insert(token.to_string(), Endpoint::new(user_id, device_id, platform, token));
    }

    #[must_use]
    pub fn get(&self, token: &str) -> Option<Endpoint> {
        self.endpoints.get(token).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn fetch_active_endpoints(&self, user_id: Uuid) -> Result<Vec<Endpoint>> {
        let mut endpoints: Vec<Endpoint> = self
            .endpoints
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.is_valid)
            .map(|entry| entry.value().clone())
            .collect();
        endpoints.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(endpoints)
    }

    async fn invalidate(&self, token: &str, reason: InvalidReason) -> bool {
        let flipped = self
            .endpoints
            .get_mut(token)
            .is_some_and(|mut endpoint| endpoint.invalidate(reason, OffsetDateTime::now_utc()));
        if flipped {
            tracing::info!(reason = %reason, "Push token invalidated");
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE: &str = "ExponentPushToken[phone]";
    const TABLET: &str = "ExponentPushToken[tablet]";

    #[tokio::test]
    async fn test_fetch_returns_only_valid_endpoints_of_user() {
        let store = InMemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        store.register_token(user_id, "phone", Platform::Ios, PHONE);
        store.register_token(user_id, "tablet", Platform::Android, TABLET);
        store.register_token(Uuid::new_v4(), "other", Platform::Ios, "ExponentPushToken[other]");
        store.invalidate(TABLET, InvalidReason::DeviceNotRegistered).await;

        let endpoints = store.fetch_active_endpoints(user_id).await.unwrap();

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].token, PHONE);
    }

    #[tokio::test]
    async fn test_invalidate_twice_equals_once() {
        let store = InMemoryTokenStore::new();
        store.register_token(Uuid::new_v4(), "phone", Platform::Ios, PHONE);

        assert!(store.invalidate(PHONE, InvalidReason::DeviceNotRegistered).await);
        let once = store.get(PHONE).unwrap();
        assert!(!store.invalidate(PHONE, InvalidReason::MalformedToken).await);
        let twice = store.get(PHONE).unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.invalid_reason, Some(InvalidReason::DeviceNotRegistered));
    }

    #[tokio::test]
    async fn test_invalidate_unknown_token_is_noop() {
        let store = InMemoryTokenStore::new();
        assert!(!store.invalidate("ExponentPushToken[nobody]", InvalidReason::Other).await);
        assert!(store.get("ExponentPushToken[nobody]").is_none());
    }

    #[tokio::test]
    async fn test_reregistering_device_supersedes_old_token() {
        let store = InMemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        store.register_token(user_id, "phone", Platform::Ios, PHONE);
        store.register_token(user_id, "phone", Platform::Ios, "ExponentPushToken[phone-v2]");

        let endpoints = store.fetch_active_endpoints(user_id).await.unwrap();

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].token, "ExponentPushToken[phone-v2]");
        assert_eq!(store.get(PHONE).unwrap().invalid_reason, Some(InvalidReason::Other));
    }
}
