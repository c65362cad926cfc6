use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use rentra_booking::stripe::verify_webhook_signature;
use rentra_booking::Reconciler;
use rentra_core::BookingError;
use tracing::{error, info, warn};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(payment_webhook))
}

/// Gateway push notifications. The signature is checked against the raw
/// body before anything is parsed; an unsigned payload never reaches the
/// reconciler.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if let Err(e) = verify_webhook_signature(&state.webhook_secret, &body, signature) {
        warn!(error = %e, "webhook signature rejected");
        return Err(StatusCode::BAD_REQUEST);
    }

    let event = Reconciler::parse_event(&body).map_err(|e| {
        warn!(error = %e, "webhook payload rejected");
        StatusCode::BAD_REQUEST
    })?;

    match state.reconciler.apply_webhook(event).await {
        Ok(Some(reservation)) => {
            info!(reservation_id = %reservation.id, "webhook applied");
            Ok(StatusCode::OK)
        }
        Ok(None) => Ok(StatusCode::OK),
        // Already logged inside the reconciler; acknowledge so the gateway
        // stops redelivering an event no retry can fix.
        Err(BookingError::ReconciliationAnomaly { .. }) => Ok(StatusCode::OK),
        Err(BookingError::Gateway(e)) => {
            warn!(error = %e, "webhook event rejected");
            Err(StatusCode::BAD_REQUEST)
        }
        Err(BookingError::NotFound) => {
            warn!("webhook references an unknown reservation");
            Err(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            error!(error = %e, "webhook processing failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
