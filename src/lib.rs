pub mod config;
pub mod error;
pub mod domain {
    pub mod context;
    pub mod payment;
    pub mod webhook;
}
pub mod idempotency;
pub mod providers;
pub mod repo;
pub mod service {
    pub mod payment_service;
    pub mod webhook_service;
}
pub mod http {
    pub mod handlers {
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
}

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub webhook_service: service::webhook_service::WebhookService,
    pub idempotency: idempotency::IdempotencyGuard,
    pub pool: sqlx::PgPool,
    pub redis_client: redis::Client,
}
