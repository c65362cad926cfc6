use rentra_api::{
    app,
    state::{AppState, AuthConfig},
};
use rentra_booking::{
    BookingEngine, BookingRules, ExpiryReaper, ReconcileRules, Reconciler, StripeGateway,
};
use rentra_core::payment::PaymentGateway;
use rentra_core::repository::{
    CacheInvalidator, IdempotencyStore, ReservationStore, VehicleLock, VehicleStore,
};
use rentra_store::{DbClient, PgReservationStore, PgVehicleStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rentra_api=debug,rentra_booking=debug,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = rentra_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Rentra API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let reservations: Arc<dyn ReservationStore> =
        Arc::new(PgReservationStore::new(db.pool.clone()));
    let vehicles: Arc<dyn VehicleStore> = Arc::new(PgVehicleStore::new(db.pool.clone()));
    let locks: Arc<dyn VehicleLock> = redis.clone();
    let idempotency: Arc<dyn IdempotencyStore> = redis.clone();
    let cache: Arc<dyn CacheInvalidator> = redis.clone();

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
        config.gateway.secret_key.clone(),
        config.gateway.base_url.clone(),
        config.gateway.success_url.clone(),
        config.gateway.cancel_url.clone(),
    ));

    let grace_window = chrono::Duration::seconds(config.rules.grace_window_seconds as i64);

    let engine = Arc::new(BookingEngine::new(
        reservations.clone(),
        vehicles.clone(),
        locks,
        idempotency,
        cache.clone(),
        BookingRules {
            grace_window,
            lock_ttl_seconds: config.rules.lock_ttl_seconds,
            idempotency_ttl_seconds: config.rules.idempotency_ttl_seconds,
        },
    ));

    let reconciler = Arc::new(Reconciler::new(
        reservations.clone(),
        vehicles.clone(),
        cache.clone(),
        gateway.clone(),
        ReconcileRules {
            poll_attempts: config.rules.verify_poll_attempts,
            poll_delay: std::time::Duration::from_millis(config.rules.verify_poll_delay_ms),
        },
    ));

    let reaper = ExpiryReaper::new(
        reservations.clone(),
        vehicles.clone(),
        cache,
        grace_window,
        std::time::Duration::from_secs(config.rules.reaper_interval_seconds),
    );
    tokio::spawn(reaper.run());

    let app_state = AppState {
        engine,
        reconciler,
        reservations,
        vehicles,
        gateway,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        webhook_secret: config.gateway.webhook_secret.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
