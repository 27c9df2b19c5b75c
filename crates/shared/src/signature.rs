//! Webhook signature verification
//!
//! Two schemes, both pure functions of (payload, header, secret):
//!
//! - **Stripe**: `Stripe-Signature: t=<unix>,v1=<hex hmac-sha256>` over `"{t}.{body}"`,
//!   with a 5 minute replay window checked before the HMAC.
//! - **Twilio**: `X-Twilio-Signature: <base64 hmac-sha1>` over the full request URL
//!   followed by every POST parameter name and value, sorted by name.
//!
//! Tags are compared without short-circuiting on the first differing byte.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Maximum age (either direction) of a Stripe signature timestamp
pub const STRIPE_TOLERANCE_SECONDS: u64 = 300;

/// Compare two byte strings in time independent of where they differ
///
/// A length mismatch is folded into the result rather than returned early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut equal = Choice::from(u8::from(a.len() == b.len()));
    for (x, y) in a.iter().zip(b.iter()) {
        equal &= x.ct_eq(y);
    }
    equal.into()
}

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    pub v1: String,
}

impl StripeSignatureHeader {
    /// Parse `t=...,v1=...` pairs; whitespace around pairs, keys and values is ignored
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<&str> = None;
        let mut v1: Option<&str> = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "t" => timestamp = Some(value),
                "v1" => v1 = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or(SignatureError::MalformedHeader)?;
        let v1 = v1.ok_or(SignatureError::MalformedHeader)?;

        Ok(Self {
            timestamp,
            v1: v1.to_string(),
        })
    }
}

/// Compute the hex HMAC-SHA256 tag Stripe would send for `payload` at `timestamp`
pub fn compute_stripe_signature(
    payload: &[u8],
    timestamp: i64,
    secret: &str,
) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Stripe webhook signature against the raw request body
///
/// `now` is the current unix time in seconds.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = StripeSignatureHeader::parse(header)?;

    let age_seconds = now.abs_diff(parsed.timestamp);
    if age_seconds > STRIPE_TOLERANCE_SECONDS {
        return Err(SignatureError::TimestampExpired { age_seconds });
    }

    let computed = compute_stripe_signature(payload, parsed.timestamp, secret)?;
    let provided = parsed.v1.to_ascii_lowercase();

    if !constant_time_eq(computed.as_bytes(), provided.as_bytes()) {
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

/// Build the string Twilio signs: URL followed by sorted `name + value` pairs
///
/// Parameters are decoded from the raw form body the signature was computed over.
fn twilio_signing_input(url: &str, form_body: &[u8]) -> Vec<u8> {
    let mut params: Vec<(String, String)> = url::form_urlencoded::parse(form_body)
        .into_owned()
        .collect();
    params.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut data = url.as_bytes().to_vec();
    for (name, value) in &params {
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(value.as_bytes());
    }
    data
}

/// Compute the base64 HMAC-SHA1 signature Twilio would send for this request
pub fn compute_twilio_signature(
    url: &str,
    form_body: &[u8],
    auth_token: &str,
) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha1::new_from_slice(auth_token.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(&twilio_signing_input(url, form_body));
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify a Twilio webhook signature
pub fn verify_twilio_signature(
    url: &str,
    form_body: &[u8],
    header: &str,
    auth_token: &str,
) -> Result<(), SignatureError> {
    let computed = compute_twilio_signature(url, form_body, auth_token)?;
    if !constant_time_eq(computed.as_bytes(), header.trim().as_bytes()) {
        return Err(SignatureError::Mismatch);
    }
    Ok(())
}
