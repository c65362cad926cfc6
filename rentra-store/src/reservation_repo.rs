use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rentra_core::repository::ReservationStore;
use rentra_core::reservation::{Reservation, ReservationDraft};
use rentra_core::{pricing, BookingError};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    customer_id: String,
    vehicle_id: Uuid,
    vehicle_registration: String,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    total_price: i64,
    daily_rate_snapshot: i64,
    status: String,
    payment_status: String,
    payment_method: String,
    external_session_id: Option<String>,
    external_transaction_id: Option<String>,
    pickup_location: String,
    dropoff_location: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = BookingError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            customer_id: row.customer_id,
            vehicle_id: row.vehicle_id,
            vehicle_registration: row.vehicle_registration,
            start_at: row.start_at,
            end_at: row.end_at,
            total_price: row.total_price,
            daily_rate_snapshot: row.daily_rate_snapshot,
            status: row.status.parse().map_err(BookingError::Store)?,
            payment_status: row.payment_status.parse().map_err(BookingError::Store)?,
            payment_method: row.payment_method.parse().map_err(BookingError::Store)?,
            external_session_id: row.external_session_id,
            external_transaction_id: row.external_transaction_id,
            pickup_location: row.pickup_location,
            dropoff_location: row.dropoff_location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VehicleForBooking {
    id: Uuid,
    daily_rate: i64,
    status: String,
}

fn db_err(e: sqlx::Error) -> BookingError {
    BookingError::Store(format!("postgres: {e}"))
}

const RESERVATION_COLUMNS: &str = "id, customer_id, vehicle_id, vehicle_registration, start_at, end_at, \
     total_price, daily_rate_snapshot, status, payment_status, payment_method, \
     external_session_id, external_transaction_id, pickup_location, dropoff_location, \
     created_at, updated_at";

/// Blocking predicate, SQL rendition. Must agree with
/// `rentra_core::availability::blocks`: confirmed always blocks, pending
/// blocks while created within the grace window, overlap is half-open.
const BLOCKING_OVERLAP: &str = "vehicle_id = $1 AND start_at < $3 AND end_at > $2 \
     AND (status = 'confirmed' OR (status = 'pending' AND created_at >= $4))";

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn create_pending(
        &self,
        draft: &ReservationDraft,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Reservation, BookingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The row lock on the vehicle serializes concurrent creators for the
        // same vehicle even when the Redis fast path was skipped or crashed;
        // the transaction, not the advisory lock, is the correctness
        // guarantee.
        let vehicle: Option<VehicleForBooking> = sqlx::query_as(
            "SELECT id, daily_rate, status FROM vehicles WHERE registration = $1 FOR UPDATE",
        )
        .bind(&draft.vehicle_registration)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let vehicle = vehicle.ok_or(BookingError::NotFound)?;
        if vehicle.status != "active" {
            return Err(BookingError::InvalidState(format!(
                "vehicle is {}",
                vehicle.status
            )));
        }

        let blocking: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reservations WHERE {BLOCKING_OVERLAP}"
        ))
        .bind(vehicle.id)
        .bind(draft.start_at)
        .bind(draft.end_at)
        .bind(now - grace)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if blocking > 0 {
            return Err(BookingError::Conflict);
        }

        let total_price = pricing::total_price(draft.start_at, draft.end_at, vehicle.daily_rate);
        let id = Uuid::new_v4();

        let row: ReservationRow = sqlx::query_as(&format!(
            "INSERT INTO reservations \
                 (id, customer_id, vehicle_id, vehicle_registration, start_at, end_at, \
                  total_price, daily_rate_snapshot, status, payment_status, payment_method, \
                  pickup_location, dropoff_location, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 'pending', $9, $10, $11, $12, $12) \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.customer_id)
        .bind(vehicle.id)
        .bind(&draft.vehicle_registration)
        .bind(draft.start_at)
        .bind(draft.end_at)
        .bind(total_price)
        .bind(vehicle.daily_rate)
        .bind(draft.payment_method.as_str())
        .bind(&draft.pickup_location)
        .bind(&draft.dropoff_location)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        row.try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<Reservation>, BookingError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn is_vehicle_available(
        &self,
        vehicle_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, BookingError> {
        let blocking: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reservations WHERE {BLOCKING_OVERLAP}"
        ))
        .bind(vehicle_id)
        .bind(start)
        .bind(end)
        .bind(now - grace)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(blocking == 0)
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        external_transaction_id: &str,
    ) -> Result<Reservation, BookingError> {
        // Conditional on still-pending so a late confirmation can never
        // resurrect an expired or cancelled row.
        let updated: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations \
             SET status = 'confirmed', payment_status = 'paid', \
                 external_transaction_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(external_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = updated {
            return row.try_into();
        }

        let current = self.find(id).await?.ok_or(BookingError::NotFound)?;
        if current.status == rentra_core::ReservationStatus::Confirmed {
            // Duplicate or out-of-order confirmation: no-op.
            return Ok(current);
        }

        Err(BookingError::ReconciliationAnomaly {
            reservation_id: id,
            state: current.status.to_string(),
            external_ref: Some(external_transaction_id.to_string()),
        })
    }

    async fn set_payment_session(&self, id: Uuid, session_id: &str) -> Result<(), BookingError> {
        let result = sqlx::query(
            "UPDATE reservations SET external_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BookingError::NotFound);
        }
        Ok(())
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reservation>, BookingError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations \
             SET status = 'expired', payment_status = 'failed', updated_at = NOW() \
             WHERE status = 'pending' AND created_at < $1 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<Reservation, BookingError> {
        let updated: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations \
             SET status = 'cancelled', \
                 payment_status = CASE WHEN payment_status = 'paid' THEN 'refunded' ELSE payment_status END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'confirmed') AND start_at > $2 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = updated {
            return row.try_into();
        }

        let current = self.find(id).await?.ok_or(BookingError::NotFound)?;
        if current.status.is_terminal() {
            Err(BookingError::InvalidState(format!(
                "reservation is already {}",
                current.status
            )))
        } else {
            Err(BookingError::InvalidState(
                "rental has already started".to_string(),
            ))
        }
    }

    async fn list_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Reservation>, BookingError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
