use uuid::Uuid;

/// Error taxonomy for the booking subsystem.
///
/// `Conflict` and `LockBusy` are deliberately distinct: a conflict means the
/// dates are taken and retrying the same window is pointless, while a busy
/// lock is transient contention and the client should retry shortly.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("vehicle not found")]
    NotFound,

    #[error("vehicle cannot be booked: {0}")]
    InvalidState(String),

    #[error("vehicle is already booked for the selected window")]
    Conflict,

    #[error("duplicate booking request, resolved to reservation {reservation_id}")]
    Duplicate { reservation_id: Uuid },

    #[error("vehicle is being processed by another request")]
    LockBusy,

    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Payment confirmed for a reservation that is no longer pending. Never
    /// resolved silently; the caller must surface it for a manual refund.
    #[error("payment for reservation {reservation_id} arrived while {state}; manual refund required")]
    ReconciliationAnomaly {
        reservation_id: Uuid,
        state: String,
        external_ref: Option<String>,
    },

    #[error("storage error: {0}")]
    Store(String),
}

impl BookingError {
    /// True for errors a client may retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::LockBusy)
    }
}
