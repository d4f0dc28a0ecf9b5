use axum::routing::{get, post};
use axum::Router;
use payment_reconciler::config::AppConfig;
use payment_reconciler::idempotency::store_redis::RedisIdempotencyCache;
use payment_reconciler::idempotency::IdempotencyGuard;
use payment_reconciler::providers::mock::{MockBehavior, MockProvider};
use payment_reconciler::providers::paypal::PaypalProvider;
use payment_reconciler::providers::ProviderRegistry;
use payment_reconciler::repo::payments_repo::PaymentsRepo;
use payment_reconciler::repo::webhook_events_repo::WebhookEventsRepo;
use payment_reconciler::service::payment_service::PaymentService;
use payment_reconciler::service::webhook_service::WebhookService;
use payment_reconciler::{http, AppState};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;
    let idempotency_cache = RedisIdempotencyCache::new(&cfg.redis_url)?;

    let mut registry = ProviderRegistry::new();
    if cfg.paypal.enabled {
        registry = registry.register(Arc::new(PaypalProvider::new(
            cfg.paypal.base_url.clone(),
            cfg.paypal.client_id.clone(),
            cfg.paypal.client_secret.clone(),
            cfg.paypal.webhook_id.clone(),
            cfg.provider_timeout_ms,
        )));
    }
    if cfg.mock_enabled {
        registry = registry.register(Arc::new(MockProvider::new(MockBehavior::from_str(
            &cfg.mock_behavior,
        ))));
    }
    let registry = Arc::new(registry);
    tracing::info!(providers = ?registry.ids(), "provider registry built");

    let payments_repo = Arc::new(PaymentsRepo { pool: pool.clone() });
    let webhook_events_repo = Arc::new(WebhookEventsRepo { pool: pool.clone() });

    let state = AppState {
        payment_service: PaymentService {
            store: payments_repo.clone(),
            registry: registry.clone(),
            provider_timeout: Duration::from_millis(cfg.provider_timeout_ms),
        },
        webhook_service: WebhookService {
            payment_store: payments_repo,
            event_store: webhook_events_repo,
            registry,
        },
        idempotency: IdempotencyGuard::new(Arc::new(idempotency_cache)),
        pool,
        redis_client,
    };

    let app = Router::new()
        .route("/health", get(http::handlers::ops::health))
        .route("/ready", get(http::handlers::ops::readiness))
        .route("/api/v1/payments", post(http::handlers::payments::create_payment))
        .route(
            "/api/v1/webhooks/:provider",
            post(http::handlers::webhooks::handle_webhook),
        )
        .layer(TimeoutLayer::new(Duration::from_millis(cfg.request_timeout_ms)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server exited gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
