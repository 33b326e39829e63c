mod common;

use common::{Behavior, FakePushProvider, expo_token};
use obscura_push::DeliveryCoordinator;
use obscura_push::adapters::database::push_token_repo::PushTokenRepository;
use obscura_push::domain::{InvalidReason, Platform, PushPayload};
use obscura_push::services::push_token_service::{PushTokenService, TokenStore};
use std::sync::Arc;
use uuid::Uuid;

async fn service() -> PushTokenService {
    PushTokenService::new(common::get_test_pool().await, PushTokenRepository::new())
}

fn unique_token(label: &str) -> String {
    expo_token(&format!("{label}-{}", Uuid::new_v4().simple()))
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_registered_tokens_are_fetched_for_user() {
    let service = service().await;
    let user_id = Uuid::new_v4();
    let (phone, tablet) = (unique_token("phone"), unique_token("tablet"));
    service.register_token(user_id, "phone", Platform::Ios, &phone).await.unwrap();
    service.register_token(user_id, "tablet", Platform::Android, &tablet).await.unwrap();
    service.register_token(Uuid::new_v4(), "phone", Platform::Ios, &unique_token("stranger")).await.unwrap();

    let endpoints = service.fetch_active_endpoints(user_id).await.unwrap();

    let mut tokens: Vec<_> = endpoints.iter().map(|e| e.token.clone()).collect();
    tokens.sort();
    let mut expected = vec![phone, tablet];
    expected.sort();
    assert_eq!(tokens, expected);
    assert!(endpoints.iter().all(|e| e.is_valid && e.user_id == user_id));
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_invalidate_is_idempotent() {
    let service = service().await;
    let user_id = Uuid::new_v4();
    let token = unique_token("phone");
    service.register_token(user_id, "phone", Platform::Ios, &token).await.unwrap();

    assert!(service.invalidate(&token, InvalidReason::DeviceNotRegistered).await);
    let once = service.find_endpoint(&token).await.unwrap().unwrap();
    assert!(!service.invalidate(&token, InvalidReason::MalformedToken).await);
    let twice = service.find_endpoint(&token).await.unwrap().unwrap();

    assert!(!once.is_valid);
    assert_eq!(once, twice);
    assert_eq!(twice.invalid_reason, Some(InvalidReason::DeviceNotRegistered));
    assert!(service.fetch_active_endpoints(user_id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_invalidate_unknown_token_is_noop() {
    let service = service().await;
    let token = unique_token("ghost");

    assert!(!service.invalidate(&token, InvalidReason::Other).await);

    assert!(service.find_endpoint(&token).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_reregistering_device_supersedes_previous_token() {
    let service = service().await;
    let user_id = Uuid::new_v4();
    let (old, new) = (unique_token("old"), unique_token("new"));
    service.register_token(user_id, "phone", Platform::Ios, &old).await.unwrap();

    service.register_token(user_id, "phone", Platform::Ios, &new).await.unwrap();

    let endpoints = service.fetch_active_endpoints(user_id).await.unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].token, new);
    let superseded = service.find_endpoint(&old).await.unwrap().unwrap();
    assert!(!superseded.is_valid);
    assert_eq!(superseded.invalid_reason, Some(InvalidReason::Other));
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_registering_invalidated_token_revives_it() {
    let service = service().await;
    let user_id = Uuid::new_v4();
    let token = unique_token("phone");
    service.register_token(user_id, "phone", Platform::Ios, &token).await.unwrap();
    service.invalidate(&token, InvalidReason::DeviceNotRegistered).await;

    service.register_token(user_id, "phone", Platform::Ios, &token).await.unwrap();

    let endpoint = service.find_endpoint(&token).await.unwrap().unwrap();
    assert!(endpoint.is_valid);
    assert_eq!(endpoint.invalid_reason, None);
    assert_eq!(endpoint.invalidated_at, None);
}

#[tokio::test]
#[ignore = "requires Postgres at DATABASE_URL"]
async fn test_delivery_cleans_unregistered_tokens_in_database() {
    let service = Arc::new(service().await);
    let user_id = Uuid::new_v4();
    let (dead, alive) = (unique_token("dead"), unique_token("alive"));
    service.register_token(user_id, "dead", Platform::Android, &dead).await.unwrap();
    service.register_token(user_id, "alive", Platform::Ios, &alive).await.unwrap();
    let provider = Arc::new(FakePushProvider::new().with_behavior(&dead, Behavior::ReceiptError("DeviceNotRegistered")));
    let coordinator =
        DeliveryCoordinator::new(Arc::clone(&service) as _, provider, &common::test_push_config());

    let report = coordinator.send_to_user(user_id, PushPayload::new("Hi", "There")).await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.cleaned, 1);
    let remaining = service.fetch_active_endpoints(user_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].token, alive);
    assert_eq!(
        service.find_endpoint(&dead).await.unwrap().unwrap().invalid_reason,
        Some(InvalidReason::DeviceNotRegistered)
    );
}
