//! The reservation transaction manager and its guard rails.
//!
//! Request flow: idempotency guard short-circuits duplicates, the Redis
//! vehicle lock serializes attempts per vehicle, then one store transaction
//! re-validates availability and commits the pending row. The lock is a
//! contention-reduction fast path only; the transaction stays correct when
//! the lock is skipped, crashed or disabled.

use chrono::{DateTime, Duration, Utc};
use rentra_core::repository::{
    CacheInvalidator, CacheScope, IdempotencyStore, ReservationStore, VehicleLock, VehicleStore,
};
use rentra_core::reservation::{PaymentMethod, Reservation, ReservationDraft};
use rentra_core::{BookingError, Vehicle};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BookingRules {
    pub grace_window: Duration,
    pub lock_ttl_seconds: u64,
    pub idempotency_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub vehicle_registration: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub pickup_location: String,
    pub dropoff_location: String,
}

#[derive(Debug, Clone)]
pub struct CreatedReservation {
    pub reservation: Reservation,
    /// Pay by this instant or the reaper reclaims the vehicle.
    pub payment_deadline: DateTime<Utc>,
}

pub struct BookingEngine {
    reservations: Arc<dyn ReservationStore>,
    vehicles: Arc<dyn VehicleStore>,
    locks: Arc<dyn VehicleLock>,
    idempotency: Arc<dyn IdempotencyStore>,
    cache: Arc<dyn CacheInvalidator>,
    rules: BookingRules,
}

/// Deterministic dedup key over everything that identifies an attempt.
pub fn fingerprint(
    customer_id: &str,
    registration: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(customer_id.as_bytes());
    hasher.update(b"|");
    hasher.update(registration.as_bytes());
    hasher.update(b"|");
    hasher.update(start.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(end.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

impl BookingEngine {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        vehicles: Arc<dyn VehicleStore>,
        locks: Arc<dyn VehicleLock>,
        idempotency: Arc<dyn IdempotencyStore>,
        cache: Arc<dyn CacheInvalidator>,
        rules: BookingRules,
    ) -> Self {
        Self {
            reservations,
            vehicles,
            locks,
            idempotency,
            cache,
            rules,
        }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    pub async fn create_reservation(
        &self,
        customer_id: &str,
        req: ReservationRequest,
    ) -> Result<CreatedReservation, BookingError> {
        let now = Utc::now();

        if req.start_at >= req.end_at {
            return Err(BookingError::InvalidRange(
                "drop-off must be after pick-up".to_string(),
            ));
        }
        if req.start_at < now {
            return Err(BookingError::InvalidRange(
                "pick-up date is in the past".to_string(),
            ));
        }

        let fp = fingerprint(
            customer_id,
            &req.vehicle_registration,
            req.start_at,
            req.end_at,
        );
        if let Some(reservation_id) = self.idempotency.existing(&fp).await? {
            return Err(BookingError::Duplicate { reservation_id });
        }

        // Fail fast on unknown vehicles and learn the owner for cache
        // invalidation; the store re-validates inside its transaction.
        let vehicle = self
            .vehicles
            .find_by_registration(&req.vehicle_registration)
            .await?
            .ok_or(BookingError::NotFound)?;

        let token = self
            .locks
            .acquire(&req.vehicle_registration, self.rules.lock_ttl_seconds)
            .await?
            .ok_or(BookingError::LockBusy)?;

        let draft = ReservationDraft {
            customer_id: customer_id.to_string(),
            vehicle_registration: req.vehicle_registration.clone(),
            start_at: req.start_at,
            end_at: req.end_at,
            payment_method: req.payment_method,
            pickup_location: req.pickup_location,
            dropoff_location: req.dropoff_location,
        };

        let created = self
            .reservations
            .create_pending(&draft, now, self.rules.grace_window)
            .await;

        // Release on every exit path. A failed release is survivable: the
        // TTL reclaims the lock.
        if let Err(e) = self.locks.release(&req.vehicle_registration, &token).await {
            warn!(registration = %req.vehicle_registration, error = %e, "failed to release vehicle lock");
        }

        let reservation = created?;

        // The ledger row is durable; everything below is best-effort
        // acceleration and must not fail the request.
        if let Err(e) = self
            .idempotency
            .record(&fp, reservation.id, self.rules.idempotency_ttl_seconds)
            .await
        {
            warn!(reservation_id = %reservation.id, error = %e, "failed to record idempotency fingerprint");
        }
        self.invalidate_caches(&reservation, Some(vehicle.owner_id))
            .await;

        info!(
            reservation_id = %reservation.id,
            registration = %reservation.vehicle_registration,
            total_price = reservation.total_price,
            "reservation created, awaiting payment"
        );

        let payment_deadline = reservation.payment_deadline(self.rules.grace_window);
        Ok(CreatedReservation {
            reservation,
            payment_deadline,
        })
    }

    /// Cancellation is orthogonal to the vehicle lock namespace: the
    /// conditional UPDATE in the store is the only synchronization needed.
    pub async fn cancel_reservation(
        &self,
        customer_id: &str,
        id: Uuid,
    ) -> Result<Reservation, BookingError> {
        let existing = self
            .reservations
            .find(id)
            .await?
            .ok_or(BookingError::NotFound)?;
        // Hide other customers' reservations rather than revealing them.
        if existing.customer_id != customer_id {
            return Err(BookingError::NotFound);
        }

        let cancelled = self.reservations.cancel(id, Utc::now()).await?;

        let owner_id = self.owner_of(&cancelled.vehicle_registration).await;
        self.invalidate_caches(&cancelled, owner_id).await;

        info!(reservation_id = %id, "reservation cancelled");
        Ok(cancelled)
    }

    /// Derived availability search: active vehicles minus those with a
    /// blocking reservation overlapping the window.
    pub async fn available_vehicles(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Vehicle>, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidRange(
                "drop-off must be after pick-up".to_string(),
            ));
        }
        let now = Utc::now();
        let mut available = Vec::new();
        for vehicle in self.vehicles.list_active().await? {
            if self
                .reservations
                .is_vehicle_available(vehicle.id, start, end, now, self.rules.grace_window)
                .await?
            {
                available.push(vehicle);
            }
        }
        Ok(available)
    }

    async fn owner_of(&self, registration: &str) -> Option<Uuid> {
        match self.vehicles.find_by_registration(registration).await {
            Ok(v) => v.map(|v| v.owner_id),
            Err(e) => {
                warn!(registration, error = %e, "owner lookup failed, skipping owner cache");
                None
            }
        }
    }

    pub(crate) async fn invalidate_caches(&self, reservation: &Reservation, owner_id: Option<Uuid>) {
        invalidate_for(self.cache.as_ref(), reservation, owner_id).await;
    }
}

/// Shared by the engine, the reaper and the reconciler: every state change
/// evicts the same three scopes.
pub(crate) async fn invalidate_for(
    cache: &dyn CacheInvalidator,
    reservation: &Reservation,
    owner_id: Option<Uuid>,
) {
    let mut targets = vec![
        (
            CacheScope::VehicleAvailability,
            reservation.vehicle_registration.clone(),
        ),
        (
            CacheScope::CustomerReservations,
            reservation.customer_id.clone(),
        ),
    ];
    if let Some(owner) = owner_id {
        targets.push((CacheScope::OwnerReservations, owner.to_string()));
    }
    for (scope, id) in targets {
        if let Err(e) = cache.invalidate(scope, &id).await {
            warn!(?scope, id, error = %e, "cache invalidation failed");
        }
    }
}
