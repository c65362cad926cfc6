//! Trait seams between the booking engine and its stores.
//!
//! The reservation ledger is the only source of truth and the only thing
//! mutated transactionally. The lock, idempotency and cache stores are
//! best-effort accelerants layered on top; any of them can be skipped or
//! lost without breaking correctness.

use crate::error::BookingError;
use crate::reservation::{Reservation, ReservationDraft};
use crate::vehicle::Vehicle;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Vehicle>, BookingError>;

    async fn list_active(&self) -> Result<Vec<Vehicle>, BookingError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// The transaction manager's critical section. In one atomic unit: load
    /// the vehicle, verify it is rentable, re-run the availability predicate
    /// in the transaction's read view, snapshot the rate, insert the
    /// pending/pending row. Aborts wholesale on any failure.
    async fn create_pending(
        &self,
        draft: &ReservationDraft,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Reservation, BookingError>;

    async fn find(&self, id: Uuid) -> Result<Option<Reservation>, BookingError>;

    /// Standalone availability check for a window, outside any transaction.
    async fn is_vehicle_available(
        &self,
        vehicle_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, BookingError>;

    /// Apply the pending/pending -> confirmed/paid transition.
    ///
    /// Confirming an already-confirmed reservation is a no-op returning the
    /// current row. Confirming an expired or cancelled reservation fails
    /// with [`BookingError::ReconciliationAnomaly`]; it is never silently
    /// resurrected.
    async fn confirm_payment(
        &self,
        id: Uuid,
        external_transaction_id: &str,
    ) -> Result<Reservation, BookingError>;

    async fn set_payment_session(&self, id: Uuid, session_id: &str)
        -> Result<(), BookingError>;

    /// Demote every pending reservation created before `cutoff` to
    /// expired/failed, returning the affected rows. Idempotent.
    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, BookingError>;

    /// Cancel a reservation, only strictly before its start and only from a
    /// non-terminal state. A paid reservation moves to refunded.
    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<Reservation, BookingError>;

    async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Reservation>, BookingError>;
}

/// Short-lived per-vehicle mutex. Exactly one concurrent holder; everyone
/// else is told to retry later rather than blocking. The TTL bounds
/// staleness from a crashed holder.
#[async_trait]
pub trait VehicleLock: Send + Sync {
    /// Returns a holder token on success, `None` when already held.
    async fn acquire(
        &self,
        registration: &str,
        ttl_seconds: u64,
    ) -> Result<Option<String>, BookingError>;

    /// Token-checked release: a stale holder must not free a lock that has
    /// expired and been re-acquired by someone else.
    async fn release(&self, registration: &str, token: &str) -> Result<(), BookingError>;
}

/// Deduplicates reservation attempts sharing a fingerprint.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn existing(&self, fingerprint: &str) -> Result<Option<Uuid>, BookingError>;

    /// Set-if-absent with TTL, written only after the reservation is
    /// durable so repeated polling resolves to the same row.
    async fn record(
        &self,
        fingerprint: &str,
        reservation_id: Uuid,
        ttl_seconds: u64,
    ) -> Result<(), BookingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    VehicleAvailability,
    CustomerReservations,
    OwnerReservations,
}

/// Evicts stale read caches. Every state change calls this synchronously
/// before reporting success, so the acting party's next read is fresh.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, scope: CacheScope, id: &str) -> Result<(), BookingError>;
}
