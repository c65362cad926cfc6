use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Completed => "completed",
        }
    }

    /// Terminal states never transition again. Completion happens outside
    /// this subsystem but still counts as terminal here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Expired | ReservationStatus::Completed
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            "completed" => Ok(ReservationStatus::Completed),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Paid => "paid",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentState::Pending),
            "paid" => Ok(PaymentState::Paid),
            "failed" => Ok(PaymentState::Failed),
            "refunded" => Ok(PaymentState::Refunded),
            other => Err(format!("unknown payment state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// A customer's claim on a vehicle for a half-open window `[start_at, end_at)`.
///
/// `total_price` and `daily_rate_snapshot` are fixed at creation and never
/// recomputed, so later changes to the vehicle's live rate cannot reprice an
/// existing reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub customer_id: String,
    pub vehicle_id: Uuid,
    pub vehicle_registration: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub total_price: i64,
    pub daily_rate_snapshot: i64,
    pub status: ReservationStatus,
    pub payment_status: PaymentState,
    pub payment_method: PaymentMethod,
    pub external_session_id: Option<String>,
    pub external_transaction_id: Option<String>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Deadline by which payment must complete before the reaper reclaims
    /// the vehicle.
    pub fn payment_deadline(&self, grace: Duration) -> DateTime<Utc> {
        self.created_at + grace
    }

    /// Cancellation is allowed only strictly before the rental starts and
    /// only from a non-terminal state.
    pub fn can_cancel(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now < self.start_at
    }
}

/// Input to the transactional create. Price fields are absent on purpose:
/// the repository snapshots the rate inside the same transaction that
/// re-checks availability.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub customer_id: String,
    pub vehicle_registration: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub pickup_location: String,
    pub dropoff_location: String,
}
