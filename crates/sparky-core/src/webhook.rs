//! Webhook signature verification.
//!
//! The API signs every webhook callback with HMAC-SHA1 over the request body,
//! keyed by the secret registered with the webhook, and sends the lowercase
//! hex digest in the [`SIGNATURE_HEADER`] header. Receivers recompute the
//! digest and compare it with a constant-time equality check.
//!
//! Structured payloads are signed over their compact JSON serialization, so
//! a body parsed into a [`serde_json::Value`] verifies as long as key order
//! was preserved when it was parsed.

use std::borrow::Cow;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-spark-signature";

/// Reasons a webhook payload failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The shared secret is empty.
    #[error("webhook secret is empty")]
    EmptySecret,

    /// No signature accompanied the payload.
    #[error("signature is missing")]
    MissingSignature,

    /// The signature is not a SHA-1 hex digest.
    #[error("signature is malformed")]
    MalformedSignature,

    /// The payload could not be turned into the bytes that were signed.
    #[error("payload could not be serialized: {0}")]
    Unserializable(String),

    /// The signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// A payload whose signed byte form can be recovered.
pub trait SignedBody {
    /// Returns the exact bytes the producer signed.
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError>;
}

impl SignedBody for [u8] {
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError> {
        Ok(Cow::Borrowed(self))
    }
}

impl SignedBody for Vec<u8> {
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl SignedBody for str {
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl SignedBody for String {
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl SignedBody for Value {
    fn signed_bytes(&self) -> Result<Cow<'_, [u8]>, AuthError> {
        serde_json::to_vec(self)
            .map(Cow::Owned)
            .map_err(|e| AuthError::Unserializable(e.to_string()))
    }
}

/// Computes the lowercase hex HMAC-SHA1 of `payload` keyed by `secret`.
pub fn sign<P>(secret: &str, payload: &P) -> Result<String, AuthError>
where
    P: SignedBody + ?Sized,
{
    if secret.is_empty() {
        return Err(AuthError::EmptySecret);
    }
    let bytes = payload.signed_bytes()?;
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::EmptySecret)?;
    mac.update(&bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies `signature_hex` against `payload` and hands the payload back.
///
/// The digest comparison runs in constant time over the hex strings; any
/// difference, including letter case, is a mismatch.
pub fn verify<'a, P>(secret: &str, signature_hex: &str, payload: &'a P) -> Result<&'a P, AuthError>
where
    P: SignedBody + ?Sized,
{
    if signature_hex.is_empty() {
        return Err(AuthError::MissingSignature);
    }
    // SHA-1 digests are 20 bytes.
    if signature_hex.len() != 40 || !signature_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::MalformedSignature);
    }

    let expected = sign(secret, payload)?;
    if bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        Ok(payload)
    } else {
        debug!("webhook signature mismatch");
        Err(AuthError::Mismatch)
    }
}

/// Verifies an inbound webhook request given its headers and body.
///
/// The signature header is located case-insensitively.
pub fn verify_request<'a, 'h, I>(headers: I, body: &'a [u8], secret: &str) -> Result<&'a [u8], AuthError>
where
    I: IntoIterator<Item = (&'h str, &'h str)>,
{
    let signature = headers
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(SIGNATURE_HEADER))
        .map(|(_, value)| value.trim())
        .ok_or(AuthError::MissingSignature)?;
    verify(secret, signature, body)
}
