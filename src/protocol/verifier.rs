//! Key registration signature verification.
//!
//! A device signs `SHA-512(prefix)` where `prefix` is the raw frame with its
//! encoded signature element cut off the end. The verifier therefore slices the
//! bytes exactly as received and never re-encodes the decoded tree: the
//! encoder on the device (legacy MessagePack `raw16`, 67 bytes for a 64-byte signature)
//! and a modern encoder (`bin8`, 66 bytes) disagree on the length of the
//! suffix, so it is measured from the frame itself.
//!
//! Verification never returns an error. Every failure cause maps to an
//! [`InvalidReason`] inside [`VerificationResult::Invalid`].

use crate::core::encoding::element_spans;
use crate::error::{BridgeError, Result};
use crate::protocol::message::{KeyInfo, KeyRegistration};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha512};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;
pub const ED25519_SIGNATURE_LENGTH: usize = 64;

/// Length of the SHA-512 digest that is actually signed
pub const DIGEST_LENGTH: usize = 64;

/// Why a registration did not verify
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("frame could not be re-read: {0}")]
    MalformedFrame(String),

    #[error("no signature element at index {0}")]
    MissingSignature(usize),

    #[error("signature is not the final element of the frame")]
    SignatureNotTerminal,

    #[error("signature bytes do not match the parsed message")]
    FrameMismatch,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed public key: expected 32 bytes, found {0}")]
    PublicKeyLength(usize),

    #[error("public key is not a valid curve point")]
    InvalidPublicKey,

    #[error("malformed signature: expected 64 bytes, found {0}")]
    SignatureLength(usize),

    #[error("signature does not match")]
    BadSignature,

    #[error("outside validity window at {now} (not before {not_before:?}, not after {not_after})")]
    OutsideValidity {
        now: i64,
        not_before: Option<i64>,
        not_after: i64,
    },
}

/// Outcome of a verification call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid,
    Invalid(InvalidReason),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid)
    }

    /// Convert into a `Result`, mapping `Invalid` to `BridgeError::VerificationFailed`
    pub fn into_result(self) -> Result<()> {
        match self {
            VerificationResult::Valid => Ok(()),
            VerificationResult::Invalid(reason) => Err(BridgeError::VerificationFailed(reason)),
        }
    }
}

impl From<std::result::Result<(), InvalidReason>> for VerificationResult {
    fn from(result: std::result::Result<(), InvalidReason>) -> Self {
        match result {
            Ok(()) => VerificationResult::Valid,
            Err(reason) => VerificationResult::Invalid(reason),
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationResult::Valid => f.write_str("valid"),
            VerificationResult::Invalid(reason) => write!(f, "INVALID ({reason})"),
        }
    }
}

/// Signature schemes a registration may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Ed25519,
}

impl SignatureScheme {
    /// Resolve an `algorithm` payload value such as `ECC_ED25519` or `Ed25519`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        match upper.strip_prefix("ECC_").unwrap_or(upper.as_str()) {
            "ED25519" => Some(SignatureScheme::Ed25519),
            _ => None,
        }
    }
}

/// The bytes covered by the signature: `raw` minus its encoded signature element.
///
/// The signature element at `signature_index` must end the frame.
pub fn signed_prefix(raw: &[u8], signature_index: usize) -> std::result::Result<&[u8], InvalidReason> {
    let spans = element_spans(raw).map_err(|e| InvalidReason::MalformedFrame(e.to_string()))?;
    let span = spans
        .get(signature_index)
        .ok_or(InvalidReason::MissingSignature(signature_index))?;
    if span.end != raw.len() {
        return Err(InvalidReason::SignatureNotTerminal);
    }
    Ok(&raw[..raw.len() - span.len()])
}

/// SHA-512 of the signed prefix
pub fn message_digest(prefix: &[u8]) -> [u8; DIGEST_LENGTH] {
    let mut digest = [0u8; DIGEST_LENGTH];
    digest.copy_from_slice(&Sha512::digest(prefix));
    digest
}

/// Verify a decoded registration against the raw bytes it was decoded from.
pub fn verify(raw: &[u8], registration: &KeyRegistration) -> VerificationResult {
    let result = signed_prefix(raw, registration.signature_index()).and_then(|prefix| {
        if !raw[prefix.len()..].ends_with(&registration.signature) {
            return Err(InvalidReason::FrameMismatch);
        }
        verify_detached(
            prefix,
            &registration.signature,
            &registration.info.algorithm,
            &registration.info.pub_key,
        )
    });

    debug!(
        device_id = %hex::encode(&registration.info.device_id),
        algorithm = %registration.info.algorithm,
        ok = result.is_ok(),
        "Registration signature checked"
    );
    result.into()
}

/// Verify `signature` over `SHA-512(prefix)` with the named scheme and key.
pub fn verify_detached(
    prefix: &[u8],
    signature: &[u8],
    algorithm: &str,
    pub_key: &[u8],
) -> std::result::Result<(), InvalidReason> {
    let scheme = SignatureScheme::from_name(algorithm)
        .ok_or_else(|| InvalidReason::UnsupportedAlgorithm(algorithm.to_string()))?;

    match scheme {
        SignatureScheme::Ed25519 => {
            let key_bytes = <[u8; ED25519_PUBLIC_KEY_LENGTH]>::try_from(pub_key)
                .map_err(|_| InvalidReason::PublicKeyLength(pub_key.len()))?;
            let key = VerifyingKey::from_bytes(&key_bytes)
                .map_err(|_| InvalidReason::InvalidPublicKey)?;
            let signature = Signature::from_slice(signature)
                .map_err(|_| InvalidReason::SignatureLength(signature.len()))?;
            key.verify(&message_digest(prefix), &signature)
                .map_err(|_| InvalidReason::BadSignature)
        }
    }
}

/// Check the registration's validity window against `now`.
///
/// Not part of [`verify`]: expiry is a policy the caller opts into.
pub fn check_validity(info: &KeyInfo, now: i64) -> VerificationResult {
    if info.is_valid_at(now) {
        VerificationResult::Valid
    } else {
        VerificationResult::Invalid(InvalidReason::OutsideValidity {
            now,
            not_before: info.valid_not_before,
            not_after: info.valid_not_after,
        })
    }
}
