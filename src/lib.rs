#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use adapters::database::DbPool;
use adapters::database::push_token_repo::PushTokenRepository;
use adapters::push::ExpoPushProvider;
use config::Config;
use services::push_token_service::PushTokenService;
use std::sync::Arc;

pub use services::notification::{DeliveryCoordinator, SendReport};

/// Applies pending database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Wires the Postgres token store and the Expo push service into a coordinator.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or the
/// push client cannot be built.
pub async fn build_coordinator(config: &Config) -> anyhow::Result<DeliveryCoordinator> {
    let pool = adapters::database::init_pool(&config.database).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PushTokenService::new(pool, PushTokenRepository::new()));
    let provider = Arc::new(ExpoPushProvider::new(&config.push)?);

    tracing::info!(api_url = %config.push.api_url, "Push delivery initialized");
    Ok(DeliveryCoordinator::new(store, provider, &config.push))
}
