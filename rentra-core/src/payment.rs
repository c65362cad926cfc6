use crate::error::BookingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Payment state as reported by the external gateway for a checkout session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Unpaid,
    Paid,
    NoPaymentRequired,
}

/// A freshly created checkout session the customer gets redirected to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Authoritative session state fetched back from the gateway.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: GatewayPaymentStatus,
    pub payment_intent: Option<String>,
    pub reservation_id: Option<Uuid>,
}

/// Boundary to the external payment processor. The webhook is best-effort
/// notification; `get_session` is the authoritative reconciliation path and
/// correctness never depends on the webhook alone.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        reservation_id: Uuid,
        display_name: &str,
        amount: i64,
    ) -> Result<CheckoutSession, BookingError>;

    async fn get_session(&self, session_id: &str) -> Result<SessionDetails, BookingError>;
}

/// In-process gateway for tests and local development. Sessions start
/// unpaid; tests flip them with [`MockGateway::mark_paid`].
#[derive(Default)]
pub struct MockGateway {
    sessions: Mutex<HashMap<String, SessionDetails>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("mock gateway poisoned");
        if let Some(session) = sessions.get_mut(session_id) {
            session.payment_status = GatewayPaymentStatus::Paid;
            session.payment_intent = Some(format!("mock_pi_{}", Uuid::new_v4().simple()));
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        reservation_id: Uuid,
        _display_name: &str,
        _amount: i64,
    ) -> Result<CheckoutSession, BookingError> {
        let id = format!("mock_cs_{}", Uuid::new_v4().simple());
        let details = SessionDetails {
            id: id.clone(),
            payment_status: GatewayPaymentStatus::Unpaid,
            payment_intent: None,
            reservation_id: Some(reservation_id),
        };
        self.sessions
            .lock()
            .expect("mock gateway poisoned")
            .insert(id.clone(), details);
        Ok(CheckoutSession {
            url: format!("https://checkout.invalid/pay/{id}"),
            id,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionDetails, BookingError> {
        self.sessions
            .lock()
            .expect("mock gateway poisoned")
            .get(session_id)
            .cloned()
            .ok_or_else(|| BookingError::Gateway(format!("unknown session {session_id}")))
    }
}
