use rentra_booking::{BookingEngine, Reconciler};
use rentra_core::payment::PaymentGateway;
use rentra_core::repository::{ReservationStore, VehicleStore};
use rentra_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub reconciler: Arc<Reconciler>,
    pub reservations: Arc<dyn ReservationStore>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub redis: Arc<RedisClient>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
}
