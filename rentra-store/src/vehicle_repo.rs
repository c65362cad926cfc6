use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentra_core::repository::VehicleStore;
use rentra_core::{BookingError, Vehicle};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgVehicleStore {
    pool: PgPool,
}

impl PgVehicleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    registration: String,
    owner_id: Uuid,
    make: String,
    model: String,
    daily_rate: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = BookingError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        Ok(Vehicle {
            id: row.id,
            registration: row.registration,
            owner_id: row.owner_id,
            make: row.make,
            model: row.model,
            daily_rate: row.daily_rate,
            status: row.status.parse().map_err(BookingError::Store)?,
            created_at: row.created_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> BookingError {
    BookingError::Store(format!("postgres: {e}"))
}

const VEHICLE_COLUMNS: &str =
    "id, registration, owner_id, make, model, daily_rate, status, created_at";

#[async_trait]
impl VehicleStore for PgVehicleStore {
    async fn find_by_registration(
        &self,
        registration: &str,
    ) -> Result<Option<Vehicle>, BookingError> {
        let row: Option<VehicleRow> = sqlx::query_as(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE registration = $1"
        ))
        .bind(registration)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Vehicle>, BookingError> {
        let rows: Vec<VehicleRow> = sqlx::query_as(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE status = 'active' ORDER BY registration"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
