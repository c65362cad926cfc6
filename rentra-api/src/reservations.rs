use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rentra_booking::ReservationRequest;
use rentra_core::{pricing, BookingError, Reservation};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::CustomerClaims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations", get(list_reservations))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}", delete(cancel_reservation))
        .route("/v1/reservations/{id}/verify", get(verify_reservation))
}

#[derive(Debug, Serialize)]
pub struct ReservationBody {
    pub id: Uuid,
    pub vehicle_registration: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub rental_days: i64,
    pub daily_rate: i64,
    pub total_price: i64,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationBody {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            rental_days: pricing::rental_days(r.start_at, r.end_at),
            vehicle_registration: r.vehicle_registration,
            start_at: r.start_at,
            end_at: r.end_at,
            daily_rate: r.daily_rate_snapshot,
            total_price: r.total_price,
            status: r.status.to_string(),
            payment_status: r.payment_status.to_string(),
            payment_method: r.payment_method.as_str().to_string(),
            pickup_location: r.pickup_location,
            dropoff_location: r.dropoff_location,
            checkout_session_id: r.external_session_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    reservation: ReservationBody,
    /// Pay before this instant or the reservation expires.
    payment_deadline: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    reservation: ReservationBody,
    payment_verified: bool,
    timed_out: bool,
}

async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<ReservationRequest>,
) -> Result<(StatusCode, Json<CreateResponse>), AppError> {
    let created = state.engine.create_reservation(&claims.sub, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            reservation: created.reservation.into(),
            payment_deadline: created.payment_deadline,
        }),
    ))
}

async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<ReservationBody>>, AppError> {
    let reservations = state.reservations.list_for_customer(&claims.sub).await?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationBody>, AppError> {
    let reservation = owned_reservation(&state, &claims, id).await?;
    Ok(Json(reservation.into()))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationBody>, AppError> {
    let cancelled = state.engine.cancel_reservation(&claims.sub, id).await?;
    Ok(Json(cancelled.into()))
}

/// Pull-side reconciliation: asks the gateway for the session state rather
/// than waiting on webhook delivery.
async fn verify_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerifyResponse>, AppError> {
    owned_reservation(&state, &claims, id).await?;

    let outcome = state.reconciler.verify_payment(id).await?;
    let payment_verified =
        outcome.reservation.payment_status == rentra_core::PaymentState::Paid;
    Ok(Json(VerifyResponse {
        reservation: outcome.reservation.into(),
        payment_verified,
        timed_out: outcome.timed_out,
    }))
}

/// Fetch a reservation, reporting someone else's as absent.
pub async fn owned_reservation(
    state: &AppState,
    claims: &CustomerClaims,
    id: Uuid,
) -> Result<Reservation, AppError> {
    let reservation = state
        .reservations
        .find(id)
        .await?
        .ok_or(BookingError::NotFound)?;
    if reservation.customer_id != claims.sub {
        return Err(BookingError::NotFound.into());
    }
    Ok(reservation)
}
