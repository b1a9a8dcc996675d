use anyhow::Context;
use std::time::Duration;

use subshop_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::GatewayRegistry,
    logging::init_logging,
    services::*,
    tasks,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_toml().context("Failed to load configuration")?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let product_service = ProductService::new(pool.clone(), config.billing.currency.clone());
    let subscription_service =
        SubscriptionService::new(pool.clone(), config.billing.expiring_window_days);
    let payment_service = PaymentService::new(
        pool.clone(),
        GatewayRegistry::mock(&config.payments),
        subscription_service.clone(),
        config.billing.currency.clone(),
    );

    if config.catalog.seed_on_startup {
        let catalog = product_service
            .seed_catalog()
            .await
            .context("Failed to seed the product catalog")?;
        log::info!("Catalog ready with {} active products", catalog.len());
    }

    let sweep = tasks::spawn_all(
        payment_service,
        subscription_service,
        Duration::from_secs(config.billing.sweep_interval_secs),
    );
    log::info!(
        "Lifecycle sweep running every {}s",
        config.billing.sweep_interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log::info!("Shutting down");
    sweep.abort();
    Ok(())
}
