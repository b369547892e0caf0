//! Device-side frame signing.
//!
//! Builds frames the way the device firmware does: encode every element but the
//! signature, hash the bytes so far with SHA-512, sign the digest with Ed25519
//! and append the signature as the last array element. Used to emulate a device
//! and to produce verification fixtures with known keys.

use crate::core::encoding::{encode_into, write_array_header, DecodedValue};
use crate::error::Result;
use crate::protocol::message::{ProtocolVariant, KEY_REGISTRATION_TYPE};
use crate::protocol::verifier::message_digest;
use ed25519_dalek::{Signer as _, SigningKey};

/// Algorithm name written into registration payloads
pub const ED25519_ALGORITHM: &str = "ECC_ED25519";

/// Validity window announced by a key registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub created: i64,
    pub not_before: i64,
    pub not_after: i64,
}

/// Ed25519 signer producing signed and chained frames
pub struct FrameSigner {
    key: SigningKey,
}

impl FrameSigner {
    /// Create a signer from a fixed 32-byte secret key.
    pub fn from_secret_key(secret_key: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&secret_key),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Encode `elements` as an array followed by a signature over them.
    pub fn sign_elements(&self, elements: &[DecodedValue]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_array_header(&mut out, elements.len() + 1)?;
        for element in elements {
            encode_into(element, &mut out)?;
        }
        let signature = self.key.sign(&message_digest(&out));
        encode_into(&DecodedValue::Bytes(signature.to_bytes().to_vec()), &mut out)?;
        Ok(out)
    }

    /// Signed-variant key registration announcing this signer's public key.
    pub fn key_registration(&self, device_id: &[u8], validity: Validity) -> Result<Vec<u8>> {
        let payload = DecodedValue::Map(vec![
            text_entry("algorithm", DecodedValue::Text(ED25519_ALGORITHM.into())),
            text_entry("created", DecodedValue::Integer(validity.created.into())),
            text_entry("hwDeviceId", DecodedValue::Bytes(device_id.to_vec())),
            text_entry("pubKey", DecodedValue::Bytes(self.public_key().to_vec())),
            text_entry("validNotAfter", DecodedValue::Integer(validity.not_after.into())),
            text_entry("validNotBefore", DecodedValue::Integer(validity.not_before.into())),
        ]);

        self.sign_elements(&[
            DecodedValue::Integer(ProtocolVariant::Signed.tag().into()),
            DecodedValue::Bytes(device_id.to_vec()),
            DecodedValue::Integer(KEY_REGISTRATION_TYPE.into()),
            payload,
        ])
    }

    /// Chained-variant frame linking to the previous frame's signature.
    pub fn chained(
        &self,
        device_id: &[u8],
        previous_signature: &[u8],
        payload_type: u64,
        payload: DecodedValue,
    ) -> Result<Vec<u8>> {
        self.sign_elements(&[
            DecodedValue::Integer(ProtocolVariant::Chained.tag().into()),
            DecodedValue::Bytes(device_id.to_vec()),
            DecodedValue::Bytes(previous_signature.to_vec()),
            DecodedValue::Integer(payload_type.into()),
            payload,
        ])
    }
}

fn text_entry(key: &str, value: DecodedValue) -> (DecodedValue, DecodedValue) {
    (DecodedValue::Text(key.to_string()), value)
}
