use axum::{
    extract::State,
    routing::post,
    Extension, Json, Router,
};
use rentra_core::{BookingError, PaymentState, ReservationStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::CustomerClaims;
use crate::reservations::owned_reservation;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/checkout", post(create_checkout))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    reservation_id: Uuid,
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    session_id: String,
    /// Customer gets redirected here to pay.
    url: String,
}

/// Open a gateway checkout session for a pending reservation. The amount
/// comes from the stored reservation, never from the request.
async fn create_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let reservation = owned_reservation(&state, &claims, req.reservation_id).await?;

    if reservation.status != ReservationStatus::Pending
        || reservation.payment_status != PaymentState::Pending
    {
        return Err(BookingError::InvalidState(format!(
            "reservation is {} / {}",
            reservation.status, reservation.payment_status
        ))
        .into());
    }

    let display_name = match state
        .vehicles
        .find_by_registration(&reservation.vehicle_registration)
        .await
    {
        Ok(Some(vehicle)) => vehicle.display_name(),
        _ => format!("Vehicle {}", reservation.vehicle_registration),
    };
    let session = state
        .gateway
        .create_checkout_session(reservation.id, &display_name, reservation.total_price)
        .await?;

    // Recorded before the customer is redirected so the verify endpoint can
    // reconcile even if the webhook never arrives.
    state
        .reservations
        .set_payment_session(reservation.id, &session.id)
        .await?;

    info!(reservation_id = %reservation.id, session_id = %session.id, "checkout session opened");
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}
