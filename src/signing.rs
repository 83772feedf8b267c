use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Headers to attach to a signed request, as `(name, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub signature: Option<(String, String)>,
    pub timestamp: Option<(String, String)>,
}

/// Signs `body` with `secret`, optionally binding the current unix time.
pub fn sign_body(
    secret: Option<&[u8]>,
    body: &[u8],
    include_timestamp: bool,
    signature_header: &str,
    timestamp_header: &str,
) -> SignatureHeaders {
    let Some(secret) = secret else {
        return SignatureHeaders::default();
    };

    if !include_timestamp {
        return SignatureHeaders {
            signature: Some((signature_header.to_string(), compute_signature(secret, body, None))),
            timestamp: None,
        };
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string();

    SignatureHeaders {
        signature: Some((
            signature_header.to_string(),
            compute_signature(secret, body, Some(&timestamp)),
        )),
        timestamp: Some((timestamp_header.to_string(), timestamp)),
    }
}

fn mac_for(secret: &[u8], body: &[u8], timestamp: Option<&str>) -> Option<HmacSha256> {
    // HMAC takes keys of any length, so this only fails on a broken backend.
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    if let Some(ts) = timestamp {
        mac.update(ts.as_bytes());
    }
    mac.update(body);
    Some(mac)
}

/// Hex-encoded HMAC-SHA256 of `timestamp || body`.
pub fn compute_signature(secret: &[u8], body: &[u8], timestamp: Option<&str>) -> String {
    mac_for(secret, body, timestamp)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Checks a hex signature produced by [`compute_signature`], in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], timestamp: Option<&str>, signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    mac_for(secret, body, timestamp)
        .map(|mac| mac.verify_slice(&signature).is_ok())
        .unwrap_or(false)
}

pub fn is_timestamp_fresh(timestamp_secs: u64, now_secs: u64, max_age_secs: u64) -> bool {
    now_secs >= timestamp_secs && now_secs - timestamp_secs <= max_age_secs
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestamp,
    StaleTimestamp,
    InvalidSignature,
}

/// Verifies a signed hook request on the receiving side.
///
/// With `timestamp_header` set the timestamp is required, must be fresh and
/// is bound into the signature. With `None` the signature covers the body
/// only, matching senders that sign without timestamps.
///
/// Header names are compared case-insensitively.
pub fn verify_request<'a, I>(
    headers: I,
    body: &[u8],
    secret: &[u8],
    signature_header: &str,
    timestamp_header: Option<&str>,
    max_age_secs: u64,
    now_secs: u64,
) -> Result<(), VerificationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut signature = None;
    let mut timestamp = None;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case(signature_header) {
            signature = Some(value);
        } else if timestamp_header.is_some_and(|header| name.eq_ignore_ascii_case(header)) {
            timestamp = Some(value);
        }
    }

    let signature = signature.ok_or(VerificationError::MissingSignature)?;

    if timestamp_header.is_none() {
        return if verify_signature(secret, body, None, signature) {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature)
        };
    }

    let timestamp = timestamp.ok_or(VerificationError::MissingTimestamp)?;
    let timestamp_secs = timestamp
        .parse::<u64>()
        .map_err(|_| VerificationError::InvalidTimestamp)?;

    if !is_timestamp_fresh(timestamp_secs, now_secs, max_age_secs) {
        return Err(VerificationError::StaleTimestamp);
    }

    if verify_signature(secret, body, Some(timestamp), signature) {
        Ok(())
    } else {
        Err(VerificationError::InvalidSignature)
    }
}
