//! Signed webhook headers
//!
//! Header format `t=<unix seconds>,v1=<hex hmac-sha256("{t}.{body}")>`, the
//! scheme Stripe uses. The email hook and the mock payment provider both rely
//! on it.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between signer and verifier, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

fn mac(secret: &str, timestamp: i64, payload: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("invalid signing secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Build the signature header for `payload` at `timestamp`
pub fn sign(secret: &str, timestamp: i64, payload: &str) -> Result<String> {
    let digest = mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

/// Check a signature header against `payload`.
///
/// Any `v1` entry may match; multiple entries appear while a secret rotates.
pub fn verify(secret: &str, header: &str, payload: &str, now: i64, tolerance_secs: i64) -> Result<()> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    PaymentError::WebhookSignature("malformed timestamp".into())
                })?);
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
    }
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(PaymentError::WebhookSignature("timestamp outside tolerance".into()));
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        // verify_slice compares in constant time
        if mac(secret, timestamp, payload)?.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::WebhookSignature("no matching signature".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &str = r#"{"type":"signup"}"#;

    #[test]
    fn test_sign_then_verify() {
        let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
        assert!(header.starts_with("t=1700000000,v1="));
        assert!(verify(SECRET, &header, BODY, 1_700_000_100, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_rejects_tampering() {
        let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
        assert!(verify(SECRET, &header, r#"{"type":"recovery"}"#, 1_700_000_000, 300).is_err());
        assert!(verify("other", &header, BODY, 1_700_000_000, 300).is_err());
    }

    #[test]
    fn test_rejects_stale_and_malformed() {
        let header = sign(SECRET, 1_700_000_000, BODY).unwrap();
        assert!(matches!(
            verify(SECRET, &header, BODY, 1_700_000_301, 300),
            Err(PaymentError::WebhookSignature(msg)) if msg.contains("tolerance")
        ));
        assert!(verify(SECRET, "v1=abcd", BODY, 0, 300).is_err());
        assert!(verify(SECRET, "t=abc,v1=abcd", BODY, 0, 300).is_err());
        assert!(verify(SECRET, "t=0", BODY, 0, 300).is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            assert!(matches!(
                verify(SECRET, header, BODY, 1_700_000_000, 300),
                Err(PaymentError::WebhookSignature(msg)) if msg.contains("tolerance")
            ));
        }
        assert!(verify(SECRET, "t=0,v1=00", BODY, i64::MIN, 300).is_err());
    }

    #[test]
    fn test_accepts_any_matching_entry() {
        let good = sign(SECRET, 10, BODY).unwrap();
        let digest = good.split_once("v1=").unwrap().1;
        let header = format!("t=10,v1=deadbeef,v1={digest}");
        assert!(verify(SECRET, &header, BODY, 10, 300).is_ok());
    }
}
