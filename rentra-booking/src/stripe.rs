//! Stripe Checkout adapter: session creation, session retrieval and webhook
//! signature verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rentra_core::payment::{
    CheckoutSession, GatewayPaymentStatus, PaymentGateway, SessionDetails,
};
use rentra_core::BookingError;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const CURRENCY: &str = "usd";

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<serde_json::Value>,
    #[serde(default)]
    metadata: serde_json::Value,
}

fn gateway_err(e: reqwest::Error) -> BookingError {
    BookingError::Gateway(format!("stripe: {e}"))
}

impl StripeGateway {
    pub fn new(secret_key: String, base_url: String, success_url: String, cancel_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            base_url,
            success_url,
            cancel_url,
        }
    }

    async fn read_session(&self, response: reqwest::Response) -> Result<SessionResponse, BookingError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BookingError::Gateway(format!(
                "stripe returned {status}: {body}"
            )));
        }
        response.json().await.map_err(gateway_err)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        reservation_id: Uuid,
        display_name: &str,
        amount: i64,
    ) -> Result<CheckoutSession, BookingError> {
        let reservation_id = reservation_id.to_string();
        let amount = amount.to_string();
        let success_url = format!(
            "{}?reservation_id={}",
            self.success_url, reservation_id
        );
        // Stripe's bracketed form encoding.
        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &success_url),
            ("cancel_url", &self.cancel_url),
            ("line_items[0][price_data][currency]", CURRENCY),
            ("line_items[0][price_data][product_data][name]", display_name),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][quantity]", "1"),
            ("metadata[reservation_id]", &reservation_id),
        ];

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(gateway_err)?;

        let session = self.read_session(response).await?;
        let url = session.url.ok_or_else(|| {
            BookingError::Gateway("checkout session has no redirect url".to_string())
        })?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionDetails, BookingError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.base_url, session_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(gateway_err)?;

        let session = self.read_session(response).await?;

        let payment_status = match session.payment_status.as_deref() {
            Some("paid") => GatewayPaymentStatus::Paid,
            Some("no_payment_required") => GatewayPaymentStatus::NoPaymentRequired,
            _ => GatewayPaymentStatus::Unpaid,
        };

        // `payment_intent` is a string id, or an object when expanded.
        let payment_intent = match session.payment_intent {
            Some(serde_json::Value::String(id)) => Some(id),
            Some(serde_json::Value::Object(obj)) => obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        };

        let reservation_id = session
            .metadata
            .get("reservation_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        Ok(SessionDetails {
            id: session.id,
            payment_status,
            payment_intent,
            reservation_id,
        })
    }
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// Header format: `t=<timestamp>,v1=<hex hmac>[,v1=...]`. The signed
/// payload is `<timestamp>.<body>`. Must run before the body is parsed;
/// an unverified payload is untrusted input.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
) -> Result<(), BookingError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| BookingError::Gateway("signature header missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(BookingError::Gateway(
            "signature header missing v1 signature".to_string(),
        ));
    }

    for candidate in signatures {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BookingError::Gateway(format!("invalid webhook secret: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice is constant-time.
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return Ok(());
        }
    }

    Err(BookingError::Gateway(
        "webhook signature verification failed".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = format!("t=1700000000,v1={}", sign("whsec_test", "1700000000", payload));
        assert!(verify_webhook_signature("whsec_test", payload, &header).is_ok());
    }

    #[test]
    fn rejects_a_tampered_body() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = format!("t=1700000000,v1={}", sign("whsec_test", "1700000000", payload));
        let tampered = br#"{"type":"checkout.session.expired"}"#;
        assert!(verify_webhook_signature("whsec_test", tampered, &header).is_err());
    }

    #[test]
    fn rejects_a_wrong_secret() {
        let payload = b"{}";
        let header = format!("t=1,v1={}", sign("whsec_other", "1", payload));
        assert!(verify_webhook_signature("whsec_test", payload, &header).is_err());
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(verify_webhook_signature("s", b"{}", "v1=abcd").is_err());
        assert!(verify_webhook_signature("s", b"{}", "t=1700000000").is_err());
        assert!(verify_webhook_signature("s", b"{}", "garbage").is_err());
    }

    #[test]
    fn accepts_any_of_multiple_v1_signatures() {
        let payload = b"{}";
        let good = sign("whsec_test", "2", payload);
        let header = format!("t=2,v1=deadbeef,v1={good}");
        assert!(verify_webhook_signature("whsec_test", payload, &header).is_ok());
    }
}
