//! In-memory stores backing the booking flow tests. They mirror the
//! Postgres/Redis implementations closely enough to exercise the engine's
//! orchestration, including the availability predicate and the conditional
//! confirmation transition.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rentra_booking::{BookingEngine, BookingRules, ExpiryReaper, ReconcileRules, Reconciler};
use rentra_core::availability;
use rentra_core::payment::{MockGateway, PaymentGateway};
use rentra_core::repository::{
    CacheInvalidator, CacheScope, IdempotencyStore, ReservationStore, VehicleLock, VehicleStore,
};
use rentra_core::reservation::{
    PaymentState, Reservation, ReservationDraft, ReservationStatus,
};
use rentra_core::{pricing, BookingError, Vehicle, VehicleStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
pub struct MemState {
    pub vehicles: HashMap<String, Vehicle>,
    pub reservations: HashMap<Uuid, Reservation>,
}

#[derive(Default)]
pub struct MemStore {
    pub state: RwLock<MemState>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_vehicle(&self, registration: &str, daily_rate: i64) -> Vehicle {
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            registration: registration.to_string(),
            owner_id: Uuid::new_v4(),
            make: "Tata".to_string(),
            model: "Nexon".to_string(),
            daily_rate,
            status: VehicleStatus::Active,
            created_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .vehicles
            .insert(registration.to_string(), vehicle.clone());
        vehicle
    }

    pub async fn set_vehicle_status(&self, registration: &str, status: VehicleStatus) {
        if let Some(v) = self.state.write().await.vehicles.get_mut(registration) {
            v.status = status;
        }
    }

    pub async fn set_daily_rate(&self, registration: &str, daily_rate: i64) {
        if let Some(v) = self.state.write().await.vehicles.get_mut(registration) {
            v.daily_rate = daily_rate;
        }
    }

    /// Shift a reservation's creation time into the past, standing in for
    /// the passage of wall-clock time.
    pub async fn backdate(&self, id: Uuid, by: Duration) {
        if let Some(r) = self.state.write().await.reservations.get_mut(&id) {
            r.created_at -= by;
        }
    }

    pub async fn get(&self, id: Uuid) -> Reservation {
        self.state
            .read()
            .await
            .reservations
            .get(&id)
            .cloned()
            .expect("reservation exists")
    }
}

#[async_trait]
impl VehicleStore for MemStore {
    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Vehicle>, BookingError> {
        Ok(self.state.read().await.vehicles.get(registration).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Vehicle>, BookingError> {
        Ok(self
            .state
            .read()
            .await
            .vehicles
            .values()
            .filter(|v| v.status == VehicleStatus::Active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReservationStore for MemStore {
    async fn create_pending(
        &self,
        draft: &ReservationDraft,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Reservation, BookingError> {
        // One write lock for the whole check-then-insert, the in-memory
        // analogue of the store transaction.
        let mut state = self.state.write().await;

        let vehicle = state
            .vehicles
            .get(&draft.vehicle_registration)
            .cloned()
            .ok_or(BookingError::NotFound)?;
        if !vehicle.is_rentable() {
            return Err(BookingError::InvalidState(format!(
                "vehicle is {}",
                vehicle.status.as_str()
            )));
        }

        let ledger = state
            .reservations
            .values()
            .filter(|r| r.vehicle_id == vehicle.id);
        if !availability::is_available(ledger, draft.start_at, draft.end_at, now, grace) {
            return Err(BookingError::Conflict);
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            customer_id: draft.customer_id.clone(),
            vehicle_id: vehicle.id,
            vehicle_registration: draft.vehicle_registration.clone(),
            start_at: draft.start_at,
            end_at: draft.end_at,
            total_price: pricing::total_price(draft.start_at, draft.end_at, vehicle.daily_rate),
            daily_rate_snapshot: vehicle.daily_rate,
            status: ReservationStatus::Pending,
            payment_status: PaymentState::Pending,
            payment_method: draft.payment_method,
            external_session_id: None,
            external_transaction_id: None,
            pickup_location: draft.pickup_location.clone(),
            dropoff_location: draft.dropoff_location.clone(),
            created_at: now,
            updated_at: now,
        };
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Reservation>, BookingError> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn is_vehicle_available(
        &self,
        vehicle_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, BookingError> {
        let state = self.state.read().await;
        let ledger = state
            .reservations
            .values()
            .filter(|r| r.vehicle_id == vehicle_id);
        Ok(availability::is_available(ledger, start, end, now, grace))
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        external_transaction_id: &str,
    ) -> Result<Reservation, BookingError> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::NotFound)?;

        match reservation.status {
            ReservationStatus::Pending => {
                reservation.status = ReservationStatus::Confirmed;
                reservation.payment_status = PaymentState::Paid;
                reservation.external_transaction_id =
                    Some(external_transaction_id.to_string());
                reservation.updated_at = Utc::now();
                Ok(reservation.clone())
            }
            ReservationStatus::Confirmed => Ok(reservation.clone()),
            other => Err(BookingError::ReconciliationAnomaly {
                reservation_id: id,
                state: other.to_string(),
                external_ref: Some(external_transaction_id.to_string()),
            }),
        }
    }

    async fn set_payment_session(&self, id: Uuid, session_id: &str) -> Result<(), BookingError> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::NotFound)?;
        reservation.external_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reservation>, BookingError> {
        let mut state = self.state.write().await;
        let mut expired = Vec::new();
        for reservation in state.reservations.values_mut() {
            if reservation.status == ReservationStatus::Pending && reservation.created_at < cutoff
            {
                reservation.status = ReservationStatus::Expired;
                reservation.payment_status = PaymentState::Failed;
                reservation.updated_at = Utc::now();
                expired.push(reservation.clone());
            }
        }
        Ok(expired)
    }

    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<Reservation, BookingError> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::NotFound)?;

        if reservation.status.is_terminal() {
            return Err(BookingError::InvalidState(format!(
                "reservation is already {}",
                reservation.status
            )));
        }
        if now >= reservation.start_at {
            return Err(BookingError::InvalidState(
                "rental has already started".to_string(),
            ));
        }

        reservation.status = ReservationStatus::Cancelled;
        if reservation.payment_status == PaymentState::Paid {
            reservation.payment_status = PaymentState::Refunded;
        }
        reservation.updated_at = now;
        Ok(reservation.clone())
    }

    async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Reservation>, BookingError> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .values()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemLock {
    held: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl VehicleLock for MemLock {
    async fn acquire(
        &self,
        registration: &str,
        _ttl_seconds: u64,
    ) -> Result<Option<String>, BookingError> {
        let mut held = self.held.lock().await;
        if held.contains_key(registration) {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        held.insert(registration.to_string(), token.clone());
        Ok(Some(token))
    }

    async fn release(&self, registration: &str, token: &str) -> Result<(), BookingError> {
        let mut held = self.held.lock().await;
        if held.get(registration).map(String::as_str) == Some(token) {
            held.remove(registration);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemIdempotency {
    map: Mutex<HashMap<String, Uuid>>,
}

#[async_trait]
impl IdempotencyStore for MemIdempotency {
    async fn existing(&self, fingerprint: &str) -> Result<Option<Uuid>, BookingError> {
        Ok(self.map.lock().await.get(fingerprint).copied())
    }

    async fn record(
        &self,
        fingerprint: &str,
        reservation_id: Uuid,
        _ttl_seconds: u64,
    ) -> Result<(), BookingError> {
        self.map
            .lock()
            .await
            .entry(fingerprint.to_string())
            .or_insert(reservation_id);
        Ok(())
    }
}

/// Records invalidations instead of evicting anything.
#[derive(Default)]
pub struct MemCache {
    pub events: Mutex<Vec<(CacheScope, String)>>,
}

impl MemCache {
    pub async fn scopes(&self) -> Vec<CacheScope> {
        self.events.lock().await.iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl CacheInvalidator for MemCache {
    async fn invalidate(&self, scope: CacheScope, id: &str) -> Result<(), BookingError> {
        self.events.lock().await.push((scope, id.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemStore>,
    pub locks: Arc<MemLock>,
    pub cache: Arc<MemCache>,
    pub gateway: Arc<MockGateway>,
    pub engine: Arc<BookingEngine>,
    pub reconciler: Reconciler,
    pub reaper: ExpiryReaper,
}

pub const GRACE_MINUTES: i64 = 10;

pub fn harness() -> Harness {
    harness_with_poll(3, std::time::Duration::from_millis(0))
}

pub fn harness_with_poll(poll_attempts: u32, poll_delay: std::time::Duration) -> Harness {
    let store = MemStore::new();
    let locks = Arc::new(MemLock::default());
    let idempotency = Arc::new(MemIdempotency::default());
    let cache = Arc::new(MemCache::default());
    let gateway = Arc::new(MockGateway::new());

    let rules = BookingRules {
        grace_window: Duration::minutes(GRACE_MINUTES),
        lock_ttl_seconds: 30,
        idempotency_ttl_seconds: 300,
    };

    let engine = Arc::new(BookingEngine::new(
        store.clone(),
        store.clone(),
        locks.clone(),
        idempotency,
        cache.clone(),
        rules,
    ));

    let reconciler = Reconciler::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        gateway.clone() as Arc<dyn PaymentGateway>,
        ReconcileRules {
            poll_attempts,
            poll_delay,
        },
    );

    let reaper = ExpiryReaper::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        Duration::minutes(GRACE_MINUTES),
        std::time::Duration::from_secs(120),
    );

    Harness {
        store,
        locks,
        cache,
        gateway,
        engine,
        reconciler,
        reaper,
    }
}
