//! Billing service entrypoint.
//!
//! Wires configuration, the Postgres adapters, the Stripe gateway, and the
//! HTTP layer together, then serves the API with axum.

use std::sync::Arc;

use axum::{middleware, routing::get, Json, Router};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prime_billing::adapters::http::middleware::{auth_middleware, JwtValidator};
use prime_billing::adapters::http::subscription::{
    subscription_routes, webhook_routes, BillingAppState,
};
use prime_billing::adapters::postgres::{
    PostgresNotificationEmitter, PostgresProcessedEventStore, PostgresSubscriptionStore,
};
use prime_billing::adapters::stripe::{StripeGateway, StripeGatewayConfig};
use prime_billing::config::AppConfig;
use prime_billing::domain::subscription::WebhookVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    tracing::info!(
        environment = ?config.server.environment,
        stripe_test_mode = config.stripe.is_test_mode(),
        "Starting billing service"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("Running migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let mut gateway_config =
        StripeGatewayConfig::new(config.stripe.api_key.expose_secret().clone());
    if let Some(base_url) = &config.stripe.api_base_url {
        gateway_config = gateway_config.with_base_url(base_url.clone());
    }

    let state = BillingAppState {
        subscription_store: Arc::new(PostgresSubscriptionStore::new(pool.clone())),
        event_ledger: Arc::new(PostgresProcessedEventStore::new(pool.clone())),
        payment_gateway: Arc::new(StripeGateway::new(gateway_config)),
        notification_emitter: Arc::new(PostgresNotificationEmitter::new(pool)),
        webhook_verifier: Arc::new(WebhookVerifier::new(
            config.stripe.webhook_secret.expose_secret().clone(),
        )),
    };

    let validator = Arc::new(JwtValidator::new(&config.auth.jwt_secret));

    // Webhooks authenticate by signature, so only the account-facing
    // routes sit behind the bearer token middleware.
    let api = Router::new()
        .nest(
            "/subscription",
            subscription_routes()
                .layer(middleware::from_fn_with_state(validator, auth_middleware)),
        )
        .nest("/webhooks", webhook_routes());

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health - liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
