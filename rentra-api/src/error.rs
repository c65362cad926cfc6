use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentra_core::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    AuthenticationError(String),
    Anyhow(anyhow::Error),
}

impl From<BookingError> for AppError {
    fn from(e: BookingError) -> Self {
        AppError::Booking(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Anyhow(e)
    }
}

/// HTTP rendering of the booking error taxonomy. 423 tells a client the
/// vehicle is momentarily contended and a retry is reasonable; 409 means
/// the request itself cannot succeed as stated.
pub fn booking_error_response(e: &BookingError) -> (StatusCode, &'static str, String) {
    match e {
        BookingError::InvalidRange(msg) => (StatusCode::BAD_REQUEST, "invalid_range", msg.clone()),
        BookingError::NotFound => (
            StatusCode::NOT_FOUND,
            "not_found",
            "resource not found".to_string(),
        ),
        BookingError::Conflict => (
            StatusCode::CONFLICT,
            "dates_unavailable",
            "vehicle is not available for the requested dates".to_string(),
        ),
        BookingError::Duplicate { .. } => (
            StatusCode::CONFLICT,
            "duplicate_request",
            "an identical reservation attempt already exists".to_string(),
        ),
        BookingError::LockBusy => (
            StatusCode::LOCKED,
            "vehicle_locked",
            "vehicle is being booked by another request, retry shortly".to_string(),
        ),
        BookingError::InvalidState(msg) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            msg.clone(),
        ),
        BookingError::Gateway(msg) => (StatusCode::BAD_GATEWAY, "gateway_error", msg.clone()),
        BookingError::ReconciliationAnomaly { .. } => (
            StatusCode::CONFLICT,
            "reconciliation_anomaly",
            "payment arrived for a reservation that is no longer pending".to_string(),
        ),
        BookingError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal Server Error".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Booking(e) => {
                let (status, code, message) = booking_error_response(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    // Store details stay in the logs, not the response.
                    tracing::error!("Internal Server Error: {}", e);
                }
                let mut body = json!({ "error": { "code": code, "message": message } });
                if let BookingError::Duplicate { reservation_id } = &e {
                    body["error"]["reservation_id"] = json!(reservation_id);
                }
                (status, body)
            }
            AppError::AuthenticationError(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": { "code": "unauthorized", "message": msg } }),
            ),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": { "code": "internal_error", "message": "Internal Server Error" } }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (
                BookingError::InvalidRange("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (BookingError::NotFound, StatusCode::NOT_FOUND),
            (BookingError::Conflict, StatusCode::CONFLICT),
            (BookingError::LockBusy, StatusCode::LOCKED),
            (
                BookingError::InvalidState("started".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (BookingError::Gateway("down".into()), StatusCode::BAD_GATEWAY),
            (
                BookingError::Store("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(booking_error_response(&err).0, expected, "{err:?}");
        }
    }

    #[test]
    fn duplicate_maps_to_conflict_with_a_stable_code() {
        let err = BookingError::Duplicate {
            reservation_id: Uuid::new_v4(),
        };
        let (status, code, _) = booking_error_response(&err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "duplicate_request");
    }

    #[test]
    fn anomaly_is_a_conflict_not_a_server_error() {
        let err = BookingError::ReconciliationAnomaly {
            reservation_id: Uuid::new_v4(),
            state: "expired".into(),
            external_ref: None,
        };
        let (status, code, _) = booking_error_response(&err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "reconciliation_anomaly");
    }

    #[test]
    fn store_errors_are_masked() {
        let (_, _, message) = booking_error_response(&BookingError::Store("pg: secret dsn".into()));
        assert!(!message.contains("secret"));
    }
}
