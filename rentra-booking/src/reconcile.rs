//! Payment reconciliation: aligning reservation state with the gateway.
//!
//! Two paths apply the same pending/pending -> confirmed/paid transition.
//! The webhook (push) is best-effort notification; the poll (pull) queries
//! the gateway directly and is the authoritative fallback when webhook
//! delivery fails. Both race safely against each other and the reaper: the
//! transition is a conditional update, and a confirmation landing on an
//! expired reservation surfaces a reconciliation anomaly instead of
//! silently resurrecting it.

use crate::engine::invalidate_for;
use rentra_core::payment::{GatewayPaymentStatus, PaymentGateway};
use rentra_core::repository::{CacheInvalidator, ReservationStore, VehicleStore};
use rentra_core::reservation::{PaymentState, Reservation, ReservationStatus};
use rentra_core::BookingError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReconcileRules {
    /// Poll budget: give up with a timeout outcome instead of hanging.
    pub poll_attempts: u32,
    pub poll_delay: std::time::Duration,
}

/// Gateway webhook payload, the subset this system reads.
#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
pub struct GatewayEventData {
    pub object: GatewayEventObject,
}

#[derive(Debug, Deserialize)]
pub struct GatewayEventObject {
    pub id: String,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub reservation: Reservation,
    pub timed_out: bool,
}

pub struct Reconciler {
    reservations: Arc<dyn ReservationStore>,
    vehicles: Arc<dyn VehicleStore>,
    cache: Arc<dyn CacheInvalidator>,
    gateway: Arc<dyn PaymentGateway>,
    rules: ReconcileRules,
}

impl Reconciler {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        vehicles: Arc<dyn VehicleStore>,
        cache: Arc<dyn CacheInvalidator>,
        gateway: Arc<dyn PaymentGateway>,
        rules: ReconcileRules,
    ) -> Self {
        Self {
            reservations,
            vehicles,
            cache,
            gateway,
            rules,
        }
    }

    pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, BookingError> {
        serde_json::from_slice(payload)
            .map_err(|e| BookingError::Gateway(format!("malformed webhook payload: {e}")))
    }

    /// Push path. The caller has already verified the event signature; this
    /// trusts the payload only to the extent of extracting the reservation
    /// id it claims to confirm.
    pub async fn apply_webhook(
        &self,
        event: GatewayEvent,
    ) -> Result<Option<Reservation>, BookingError> {
        if event.event_type != "checkout.session.completed" {
            return Ok(None);
        }

        let reservation_id = event
            .data
            .object
            .metadata
            .get("reservation_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                BookingError::Gateway(format!(
                    "webhook event {} carries no reservation_id metadata",
                    event.id
                ))
            })?;

        let external_ref = event
            .data
            .object
            .payment_intent
            .unwrap_or(event.data.object.id);

        let reservation = self.confirm(reservation_id, &external_ref).await?;
        info!(reservation_id = %reservation_id, "reservation confirmed via webhook");
        Ok(Some(reservation))
    }

    /// Pull path. Queries the gateway for the authoritative session state,
    /// retrying within the poll budget, then reports the reservation as it
    /// stands. Safe to call repeatedly.
    pub async fn verify_payment(&self, id: Uuid) -> Result<VerifyOutcome, BookingError> {
        let reservation = self
            .reservations
            .find(id)
            .await?
            .ok_or(BookingError::NotFound)?;

        if reservation.status == ReservationStatus::Confirmed
            && reservation.payment_status == PaymentState::Paid
        {
            return Ok(VerifyOutcome {
                reservation,
                timed_out: false,
            });
        }

        let Some(session_id) = reservation.external_session_id.clone() else {
            // No checkout session was ever started; nothing to reconcile.
            return Ok(VerifyOutcome {
                reservation,
                timed_out: false,
            });
        };

        for attempt in 1..=self.rules.poll_attempts {
            match self.gateway.get_session(&session_id).await {
                Ok(session) if session.payment_status == GatewayPaymentStatus::Paid => {
                    let external_ref = session.payment_intent.unwrap_or(session.id);
                    let confirmed = self.confirm(id, &external_ref).await?;
                    info!(reservation_id = %id, attempt, "reservation confirmed via poll");
                    return Ok(VerifyOutcome {
                        reservation: confirmed,
                        timed_out: false,
                    });
                }
                Ok(_) => {}
                // Gateway hiccups are not fatal to the poll loop; the budget
                // bounds how long we keep trying.
                Err(e) => warn!(reservation_id = %id, attempt, error = %e, "gateway status query failed"),
            }
            if attempt < self.rules.poll_attempts {
                tokio::time::sleep(self.rules.poll_delay).await;
            }
        }

        let current = self
            .reservations
            .find(id)
            .await?
            .ok_or(BookingError::NotFound)?;
        Ok(VerifyOutcome {
            reservation: current,
            timed_out: true,
        })
    }

    async fn confirm(
        &self,
        id: Uuid,
        external_ref: &str,
    ) -> Result<Reservation, BookingError> {
        let result = self.reservations.confirm_payment(id, external_ref).await;

        match result {
            Ok(reservation) => {
                let owner_id = match self
                    .vehicles
                    .find_by_registration(&reservation.vehicle_registration)
                    .await
                {
                    Ok(v) => v.map(|v| v.owner_id),
                    Err(_) => None,
                };
                invalidate_for(self.cache.as_ref(), &reservation, owner_id).await;
                Ok(reservation)
            }
            Err(e @ BookingError::ReconciliationAnomaly { .. }) => {
                // Operator-visible: the fee was taken for a reservation the
                // reaper already reclaimed. Manual refund, never auto-fixed.
                error!(reservation_id = %id, anomaly = %e, "payment confirmed for a non-pending reservation");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
