use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rentra_core::Vehicle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/vehicles/available", get(available_vehicles))
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct VehicleBody {
    id: Uuid,
    registration: String,
    make: String,
    model: String,
    daily_rate: i64,
}

impl From<Vehicle> for VehicleBody {
    fn from(v: Vehicle) -> Self {
        Self {
            id: v.id,
            registration: v.registration,
            make: v.make,
            model: v.model,
            daily_rate: v.daily_rate,
        }
    }
}

/// Derived availability: active fleet minus vehicles with a blocking
/// reservation overlapping `[start, end)`.
async fn available_vehicles(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<VehicleBody>>, AppError> {
    let vehicles = state
        .engine
        .available_vehicles(query.start, query.end)
        .await?;
    Ok(Json(vehicles.into_iter().map(Into::into).collect()))
}
