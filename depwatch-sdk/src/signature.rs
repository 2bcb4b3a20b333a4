//! Webhook signing.
//!
//! Every webhook request carries a `Depwatch-Signature` header of the form
//! `{unix_timestamp}.{base64(mac)}` where `mac` is
//! `HMAC-SHA256(secret, "{unix_timestamp}.{body}")`. Receivers recompute the
//! MAC over the raw body and reject timestamps outside [`MAX_SIGNATURE_AGE`].

use std::fmt;
use std::str::FromStr;

use ring::hmac;

use crate::objects::WebhookBody;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Depwatch-Signature";

/// Header name for admin API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Depwatch-Admin-Authorization";

/// Accepted clock distance between signer and receiver, in seconds.
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

const MAC_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is not `timestamp.mac`")]
    InvalidFormat,
    #[error("signature mac is not valid base64")]
    InvalidBase64,
    #[error("signature mac has {0} bytes, expected 32")]
    InvalidLength(usize),
    #[error("signature does not match the body")]
    Mismatch,
    #[error("signature timestamp {timestamp} is outside the accepted window")]
    OutsideWindow { timestamp: i64 },
    #[error("body is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The parsed value of a `Depwatch-Signature` header.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WebhookSignature {
    pub timestamp: i64,
    pub mac: [u8; MAC_LEN],
}

fn signing_key(secret: &[u8]) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret)
}

fn signed_message(timestamp: i64, body: &str) -> String {
    format!("{timestamp}.{body}")
}

impl WebhookSignature {
    /// Sign `body` as sent at `timestamp`.
    pub fn compute(secret: &[u8], timestamp: i64, body: &str) -> Self {
        let tag = hmac::sign(&signing_key(secret), signed_message(timestamp, body).as_bytes());
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(tag.as_ref());
        Self { timestamp, mac }
    }

    /// Check the MAC over `body` and that the timestamp is within
    /// [`MAX_SIGNATURE_AGE`] of `now`.
    pub fn check(&self, secret: &[u8], body: &str, now: i64) -> Result<(), SignatureError> {
        hmac::verify(
            &signing_key(secret),
            signed_message(self.timestamp, body).as_bytes(),
            &self.mac,
        )
        .map_err(|_| SignatureError::Mismatch)?;
        if (now - self.timestamp).abs() > MAX_SIGNATURE_AGE {
            return Err(SignatureError::OutsideWindow {
                timestamp: self.timestamp,
            });
        }
        Ok(())
    }
}

impl FromStr for WebhookSignature {
    type Err = SignatureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (timestamp, encoded) = value
            .trim()
            .split_once('.')
            .ok_or(SignatureError::InvalidFormat)?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidFormat)?;
        let decoded = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded)
            .map_err(|_| SignatureError::InvalidBase64)?;
        let mac = <[u8; MAC_LEN]>::try_from(decoded.as_slice())
            .map_err(|_| SignatureError::InvalidLength(decoded.len()))?;
        Ok(Self { timestamp, mac })
    }
}

impl fmt::Display for WebhookSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.timestamp,
            fast32::base64::RFC4648_NOPAD.encode(&self.mac)
        )
    }
}

impl fmt::Debug for WebhookSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WebhookSignature").field(&self.to_string()).finish()
    }
}

/// A webhook body serialized once and signed over those exact bytes.
#[derive(Debug, Clone)]
pub struct SignedWebhook<T> {
    body: T,
    json: String,
    signature: WebhookSignature,
}

impl<T: WebhookBody> SignedWebhook<T> {
    /// Serialize and sign `body` with the current time.
    pub fn seal(body: T, secret: &[u8]) -> Result<Self, serde_json::Error> {
        Self::seal_at(body, secret, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn seal_at(body: T, secret: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let signature = WebhookSignature::compute(secret, timestamp, &json);
        Ok(Self {
            body,
            json,
            signature,
        })
    }

    /// Authenticate a received request and decode its body.
    ///
    /// The MAC is checked against the raw body before it is parsed.
    pub fn open(header_value: &str, json: &str, secret: &[u8]) -> Result<T, SignatureError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Self::open_at(header_value, json, secret, now)
    }

    pub fn open_at(
        header_value: &str,
        json: &str,
        secret: &[u8],
        now: i64,
    ) -> Result<T, SignatureError> {
        let signature: WebhookSignature = header_value.parse()?;
        signature.check(secret, json, now)?;
        Ok(serde_json::from_str(json)?)
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    /// The exact bytes that were signed; send these as the request body.
    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn signature(&self) -> &WebhookSignature {
        &self.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl WebhookBody for Ping {}

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_sealed_webhook_opens_with_same_secret() {
        let sealed = SignedWebhook::seal_at(Ping { seq: 1 }, b"secret", NOW).unwrap();
        let header = sealed.signature().to_string();
        assert!(header.starts_with("1700000000."));

        let opened = SignedWebhook::<Ping>::open_at(&header, sealed.json(), b"secret", NOW + 5);
        assert_eq!(opened.unwrap(), Ping { seq: 1 });
    }

    #[test]
    fn test_header_value_round_trips() {
        let signature = WebhookSignature::compute(b"secret", NOW, "{}");
        let parsed: WebhookSignature = signature.to_string().parse().unwrap();
        assert_eq!(parsed, signature);
    }

    #[test]
    fn test_wrong_secret_or_tampered_body_is_rejected() {
        let sealed = SignedWebhook::seal_at(Ping { seq: 1 }, b"secret", NOW).unwrap();
        let header = sealed.signature().to_string();
        assert!(matches!(
            SignedWebhook::<Ping>::open_at(&header, r#"{"seq":2}"#, b"secret", NOW),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            SignedWebhook::<Ping>::open_at(&header, sealed.json(), b"other", NOW),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_timestamp_window_applies_both_ways() {
        let signature = WebhookSignature::compute(b"secret", NOW, "{}");
        assert!(signature.check(b"secret", "{}", NOW + MAX_SIGNATURE_AGE).is_ok());
        assert!(matches!(
            signature.check(b"secret", "{}", NOW + MAX_SIGNATURE_AGE + 1),
            Err(SignatureError::OutsideWindow { timestamp: NOW })
        ));
        assert!(matches!(
            signature.check(b"secret", "{}", NOW - MAX_SIGNATURE_AGE - 1),
            Err(SignatureError::OutsideWindow { .. })
        ));
    }

    #[test]
    fn test_malformed_header_values() {
        assert!(matches!(
            "no-dot".parse::<WebhookSignature>(),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            "soon.AAAA".parse::<WebhookSignature>(),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            "12.***".parse::<WebhookSignature>(),
            Err(SignatureError::InvalidBase64)
        ));
        assert!(matches!(
            "12.AAAA".parse::<WebhookSignature>(),
            Err(SignatureError::InvalidLength(3))
        ));
    }
}
