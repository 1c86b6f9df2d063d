//! Signature verification for inbound identity-provider webhooks.
//!
//! The provider signs `"{id}.{timestamp}.{payload}"` with HMAC-SHA256 using
//! a `whsec_`-prefixed base64 secret and sends the result as one or more
//! space-separated `v1,<base64>` entries in the signature header.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;
const SIGNATURE_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureValidation {
    Valid,
    Missing,
    Invalid,
    Expired,
}

impl SignatureValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Missing => "Signature header missing",
            Self::Invalid => "Invalid signature",
            Self::Expired => "Timestamp outside tolerance",
        }
    }
}

pub struct SignatureVerifier {
    key: Vec<u8>,
    tolerance: Duration,
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Self {
        let trimmed = secret.strip_prefix("whsec_").unwrap_or(secret);
        // Secrets that are not valid base64 are used as raw key bytes.
        let key = BASE64
            .decode(trimmed)
            .unwrap_or_else(|_| trimmed.as_bytes().to_vec());

        Self {
            key,
            tolerance: Duration::seconds(TIMESTAMP_TOLERANCE_SECONDS),
        }
    }

    pub fn sign(&self, msg_id: &str, timestamp: DateTime<Utc>, payload: &str) -> String {
        let signed_content = format!("{}.{}.{}", msg_id, timestamp.timestamp(), payload);

        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(signed_content.as_bytes());

        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("{SIGNATURE_VERSION},{signature}")
    }

    pub fn verify(
        &self,
        msg_id: &str,
        timestamp_header: &str,
        signature_header: &str,
        payload: &str,
    ) -> SignatureValidation {
        if msg_id.is_empty() || timestamp_header.is_empty() || signature_header.is_empty() {
            return SignatureValidation::Missing;
        }

        let timestamp: i64 = match timestamp_header.parse() {
            Ok(t) => t,
            Err(_) => return SignatureValidation::Invalid,
        };

        let request_time = match DateTime::from_timestamp(timestamp, 0) {
            Some(t) => t,
            None => return SignatureValidation::Invalid,
        };

        let now = Utc::now();
        if now - request_time > self.tolerance || request_time - now > self.tolerance {
            return SignatureValidation::Expired;
        }

        let expected = self.sign(msg_id, request_time, payload);

        // The header may carry several versioned signatures; any matching
        // v1 entry passes.
        let matched = signature_header
            .split_whitespace()
            .any(|candidate| constant_time_compare(candidate, &expected));

        if matched {
            SignatureValidation::Valid
        } else {
            SignatureValidation::Invalid
        }
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldA==";

    #[test]
    fn valid_signature_verifies() {
        let verifier = SignatureVerifier::new(SECRET);
        let timestamp = Utc::now();
        let payload = r#"{"type":"user.created"}"#;

        let signature = verifier.sign("msg_1", timestamp, payload);
        let result = verifier.verify(
            "msg_1",
            &timestamp.timestamp().to_string(),
            &signature,
            payload,
        );

        assert!(result.is_valid());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET);
        let timestamp = Utc::now();

        let signature = verifier.sign("msg_1", timestamp, r#"{"type":"user.created"}"#);
        let result = verifier.verify(
            "msg_1",
            &timestamp.timestamp().to_string(),
            &signature,
            r#"{"type":"user.deleted"}"#,
        );

        assert_eq!(result, SignatureValidation::Invalid);
    }

    #[test]
    fn missing_headers_are_reported() {
        let verifier = SignatureVerifier::new(SECRET);
        let result = verifier.verify("", "", "", "{}");
        assert_eq!(result, SignatureValidation::Missing);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET);
        let old = Utc::now() - Duration::seconds(TIMESTAMP_TOLERANCE_SECONDS * 2);
        let payload = "{}";

        let signature = verifier.sign("msg_1", old, payload);
        let result = verifier.verify("msg_1", &old.timestamp().to_string(), &signature, payload);

        assert_eq!(result, SignatureValidation::Expired);
    }

    #[test]
    fn any_matching_entry_in_signature_list_passes() {
        let verifier = SignatureVerifier::new(SECRET);
        let timestamp = Utc::now();
        let payload = "{}";

        let good = verifier.sign("msg_1", timestamp, payload);
        let header = format!("v1,bm90LWEtcmVhbC1zaWduYXR1cmU= {good}");

        let result = verifier.verify(
            "msg_1",
            &timestamp.timestamp().to_string(),
            &header,
            payload,
        );

        assert!(result.is_valid());
    }

    #[test]
    fn constant_time_compare_rejects_length_mismatch() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
