//! Payment webhook signature verification and payloads.
//!
//! The payment provider signs each delivery with HMAC-SHA256 over
//! `v1:{timestamp}:{body}` and sends the result as `v1=<hex>` in the
//! `x-bazaar-signature` header, with the timestamp in `x-bazaar-timestamp`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

/// Header carrying the signing timestamp (Unix seconds).
pub const TIMESTAMP_HEADER: &str = "x-bazaar-timestamp";
/// Header carrying the `v1=` signature.
pub const SIGNATURE_HEADER: &str = "x-bazaar-signature";

/// How far a timestamp may drift from our clock, in seconds.
const MAX_SKEW_SECS: i64 = 300;

/// Errors from webhook verification.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A signing header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// Timestamp, signature or replay window check failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Body is not a payment event.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Kind of payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PaymentEventKind {
    #[serde(rename = "payment.succeeded")]
    Succeeded,
    #[serde(rename = "payment.failed")]
    Failed,
}

/// Webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub event: PaymentEventKind,
    pub payment_reference: String,
    pub amount: Decimal,
}

impl PaymentEvent {
    /// Parse a verified body.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Payload` if the JSON does not match.
    pub fn parse(body: &str) -> Result<Self, WebhookError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Verify a webhook delivery against the shared secret.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the timestamp is malformed or
/// stale, or the signature does not match.
pub fn verify_signature(
    secret: &SecretString,
    timestamp: &str,
    body: &str,
    signature: &str,
) -> Result<(), WebhookError> {
    verify_signature_at(secret, timestamp, body, signature, Utc::now().timestamp())
}

fn verify_signature_at(
    secret: &SecretString,
    timestamp: &str,
    body: &str,
    signature: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature("Invalid timestamp".to_string()))?;

    if ts.abs_diff(now) > MAX_SKEW_SECS.unsigned_abs() {
        return Err(WebhookError::InvalidSignature(
            "Request timestamp too old".to_string(),
        ));
    }

    let expected = sign(secret, timestamp, body)?;

    if !constant_time_compare(&expected, signature) {
        return Err(WebhookError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    debug!("Payment webhook signature verified");
    Ok(())
}

/// Compute the `v1=` signature of a body.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the key is rejected.
pub fn sign(secret: &SecretString, timestamp: &str, body: &str) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
    mac.update(format!("v1:{timestamp}:{body}").as_bytes());
    Ok(format!("v1={}", hex::encode(mac.finalize().into_bytes())))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn secret() -> SecretString {
        SecretString::from("whsec-test-secret".to_string())
    }

    #[test]
    fn test_valid_signature() {
        let ts = NOW.to_string();
        let body = r#"{"event":"payment.succeeded"}"#;
        let signature = sign(&secret(), &ts, body).unwrap();
        assert!(signature.starts_with("v1="));
        assert!(verify_signature_at(&secret(), &ts, body, &signature, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let ts = NOW.to_string();
        let signature = sign(&secret(), &ts, "original").unwrap();
        assert!(matches!(
            verify_signature_at(&secret(), &ts, "tampered", &signature, NOW),
            Err(WebhookError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_stale_and_malformed_timestamps() {
        let ts = NOW.to_string();
        let signature = sign(&secret(), &ts, "body").unwrap();
        assert!(verify_signature_at(&secret(), &ts, "body", &signature, NOW + 301).is_err());
        assert!(verify_signature_at(&secret(), &ts, "body", &signature, NOW - 301).is_err());
        assert!(verify_signature_at(&secret(), "yesterday", "body", &signature, NOW).is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        for ts in [i64::MIN, i64::MAX] {
            let ts = ts.to_string();
            let signature = sign(&secret(), &ts, "{}").unwrap();
            assert!(verify_signature_at(&secret(), &ts, "{}", &signature, NOW).is_err());
        }
        assert!(verify_signature_at(&secret(), "-9223372036854775808", "{}", "v1=00", NOW).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_parse_event() {
        let event = PaymentEvent::parse(
            r#"{"event":"payment.failed","payment_reference":"pay_1","amount":"12.50"}"#,
        )
        .unwrap();
        assert_eq!(event.event, PaymentEventKind::Failed);
        assert_eq!(event.amount, Decimal::new(1250, 2));

        assert!(matches!(
            PaymentEvent::parse(r#"{"event":"refund.created","payment_reference":"x","amount":"1"}"#),
            Err(WebhookError::Payload(_))
        ));
    }
}
