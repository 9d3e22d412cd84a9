//! Webhook signature verification.
//!
//! HMAC-SHA256 over `{timestamp}.{body}` with constant-time comparison and a
//! replay window on the signature timestamp.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::provider_event::ProviderEvent;
use super::webhook_errors::WebhookError;

/// Maximum allowed age for webhook deliveries (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Tolerated clock skew for timestamps from the future (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the provider's signature header.
///
/// Format: `t=<unix timestamp>,v1=<hex hmac>[,<ignored fields>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::Parse("invalid signature header".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| WebhookError::Parse("invalid timestamp".to_string()))?,
                    );
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        WebhookError::Parse("invalid v1 signature hex".to_string())
                    })?);
                }
                // Unknown schemes are ignored for forward compatibility.
                _ => {}
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp
                .ok_or_else(|| WebhookError::Parse("missing timestamp".to_string()))?,
            v1_signature: v1_signature
                .ok_or_else(|| WebhookError::Parse("missing v1 signature".to_string()))?,
        })
    }
}

/// Verifies webhook deliveries against the shared signing secret.
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies the signature over the raw body and parses the envelope.
    ///
    /// The body must be the exact bytes received; re-serialized JSON will not
    /// match the signature.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` when the HMAC does not match
    /// - `TimestampOutOfRange` / `InvalidTimestamp` when outside the replay window
    /// - `Parse` when the header or JSON body is malformed
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProviderEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.validate_timestamp(header.timestamp)?;

        let expected = self.compute_signature(header.timestamp, payload);
        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(WebhookError::InvalidSignature);
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::Parse(e.to_string()))
    }

    fn validate_timestamp(&self, timestamp: i64) -> Result<(), WebhookError> {
        let age = chrono::Utc::now().timestamp() - timestamp;

        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::InvalidTimestamp);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));

        let mut mac =
            Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key");
        mac.update(signed_payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time byte comparison to avoid leaking signature prefixes.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes a valid hex signature for test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, timestamp: i64, payload: &str) -> String {
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
