//! Message schema for device frames.
//!
//! Every frame is a top-level array whose first element is a tag that fixes the
//! positional layout of the rest. There is no version negotiation: the layouts
//! below are a frozen wire contract and unknown tags are rejected instead of
//! guessed at.
//!
//! ```text
//! signed  (0x12): [tag, sender, payload_type, payload, signature]
//! chained (0x13): [tag, sender, previous_signature, payload_type, payload, signature]
//! ```
//!
//! Elements past the layout's arity and unknown payload keys are ignored.

use crate::core::encoding::DecodedValue;
use crate::error::{constants, BridgeError, Result};
use std::fmt;

/// Payload type of a key registration
pub const KEY_REGISTRATION_TYPE: u64 = 0x01;

/// Positions of the envelope fields inside the top-level array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub arity: usize,
    pub sender: usize,
    pub previous_signature: Option<usize>,
    pub payload_type: usize,
    pub payload: usize,
    pub signature: usize,
}

const SIGNED_LAYOUT: Layout = Layout {
    arity: 5,
    sender: 1,
    previous_signature: None,
    payload_type: 2,
    payload: 3,
    signature: 4,
};

const CHAINED_LAYOUT: Layout = Layout {
    arity: 6,
    sender: 1,
    previous_signature: Some(2),
    payload_type: 3,
    payload: 4,
    signature: 5,
};

/// Message type tag at index 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    Signed,
    Chained,
}

impl ProtocolVariant {
    pub fn from_tag(tag: i128) -> Option<Self> {
        match tag {
            0x12 => Some(ProtocolVariant::Signed),
            0x13 => Some(ProtocolVariant::Chained),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ProtocolVariant::Signed => 0x12,
            ProtocolVariant::Chained => 0x13,
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            ProtocolVariant::Signed => SIGNED_LAYOUT,
            ProtocolVariant::Chained => CHAINED_LAYOUT,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Signed => f.write_str("signed"),
            ProtocolVariant::Chained => f.write_str("chained"),
        }
    }
}

/// Sender identifier at index 1: a sequence number or a device UUID, opaque here
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderId {
    Integer(i128),
    Bytes(Vec<u8>),
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderId::Integer(n) => write!(f, "{n}"),
            SenderId::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}

/// Any signed or chained frame, payload left undecoded
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub variant: ProtocolVariant,
    pub sender: SenderId,
    pub previous_signature: Option<Vec<u8>>,
    pub payload_type: u64,
    pub payload: DecodedValue,
    pub signature: Vec<u8>,
}

fn mismatch(reason: impl Into<String>) -> BridgeError {
    BridgeError::SchemaMismatch(reason.into())
}

/// Top-level elements that can be moved out one position at a time
struct Fields(Vec<Option<DecodedValue>>);

impl Fields {
    fn take(&mut self, index: usize, name: &str) -> Result<DecodedValue> {
        self.0
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| mismatch(format!("missing {name} at index {index}")))
    }
}

fn bytes_field(value: DecodedValue, name: &str) -> Result<Vec<u8>> {
    match value {
        DecodedValue::Bytes(b) => Ok(b),
        DecodedValue::Text(s) => Ok(s.into_bytes()),
        other => Err(mismatch(format!(
            "{name} must be bytes, found {}",
            other.type_name()
        ))),
    }
}

impl Envelope {
    /// Interpret a decoded top-level array as an envelope.
    ///
    /// # Errors
    /// Returns `BridgeError::SchemaMismatch` for a non-array value, an unknown
    /// tag, too few elements, or envelope fields of the wrong type.
    pub fn parse(value: DecodedValue) -> Result<Self> {
        let items = match value {
            DecodedValue::Array(items) => items,
            other => {
                return Err(mismatch(format!(
                    "{}, found {}",
                    constants::ERR_NOT_AN_ARRAY,
                    other.type_name()
                )))
            }
        };

        let tag = items
            .first()
            .and_then(DecodedValue::as_integer)
            .ok_or_else(|| mismatch("message type tag must be an integer"))?;
        let variant = ProtocolVariant::from_tag(tag)
            .ok_or_else(|| mismatch(format!("{}: {tag:#04x}", constants::ERR_UNKNOWN_VARIANT)))?;
        let layout = variant.layout();

        if items.len() < layout.arity {
            return Err(mismatch(format!(
                "{variant} message needs at least {} elements, found {}",
                layout.arity,
                items.len()
            )));
        }

        let mut fields = Fields(items.into_iter().take(layout.arity).map(Some).collect());

        let sender = match fields.take(layout.sender, "sender")? {
            DecodedValue::Integer(n) => SenderId::Integer(n),
            other => SenderId::Bytes(bytes_field(other, "sender")?),
        };
        let previous_signature = match layout.previous_signature {
            Some(index) => Some(bytes_field(
                fields.take(index, "previous signature")?,
                "previous signature",
            )?),
            None => None,
        };
        let payload_type = fields
            .take(layout.payload_type, "payload type")?
            .as_u64()
            .ok_or_else(|| mismatch("payload type must be an unsigned integer"))?;
        let payload = fields.take(layout.payload, "payload")?;
        let signature = bytes_field(fields.take(layout.signature, "signature")?, "signature")?;

        Ok(Self {
            variant,
            sender,
            previous_signature,
            payload_type,
            payload,
            signature,
        })
    }

    pub fn is_key_registration(&self) -> bool {
        self.payload_type == KEY_REGISTRATION_TYPE
    }
}

/// Public key material announced in a registration payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Signature scheme name, e.g. `ECC_ED25519`
    pub algorithm: String,
    pub device_id: Vec<u8>,
    pub pub_key: Vec<u8>,
    /// Device-local epoch seconds
    pub created: i64,
    pub valid_not_before: Option<i64>,
    pub valid_not_after: i64,
}

impl KeyInfo {
    /// Extract the named payload fields, in any order.
    pub fn from_payload(payload: &DecodedValue) -> Result<Self> {
        if payload.as_map().is_none() {
            return Err(mismatch(format!(
                "payload must be a map, found {}",
                payload.type_name()
            )));
        }

        let required = |name: &str| {
            payload
                .get(name)
                .ok_or_else(|| mismatch(format!("payload is missing '{name}'")))
        };
        let bytes = |value: &DecodedValue, name: &str| {
            value
                .as_bytes()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| mismatch(format!("'{name}' must be bytes, found {}", value.type_name())))
        };
        let timestamp = |value: &DecodedValue, name: &str| {
            value
                .as_i64()
                .ok_or_else(|| mismatch(format!("'{name}' must be an integer timestamp")))
        };

        let algorithm = required("algorithm")?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch("'algorithm' must be a string"))?;
        let device_id = match payload.get("hwDeviceId").or_else(|| payload.get("deviceId")) {
            Some(value) => bytes(value, "hwDeviceId")?,
            None => return Err(mismatch("payload is missing 'hwDeviceId'")),
        };
        let pub_key = bytes(required("pubKey")?, "pubKey")?;
        let created = timestamp(required("created")?, "created")?;
        let valid_not_after = timestamp(required("validNotAfter")?, "validNotAfter")?;
        let valid_not_before = payload
            .get("validNotBefore")
            .map(|value| timestamp(value, "validNotBefore"))
            .transpose()?;

        Ok(Self {
            algorithm,
            device_id,
            pub_key,
            created,
            valid_not_before,
            valid_not_after,
        })
    }

    /// Whether `now` falls inside `[validNotBefore, validNotAfter]`
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.valid_not_before.map_or(true, |nb| now >= nb) && now <= self.valid_not_after
    }
}

/// A decoded key registration message
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRegistration {
    pub variant: ProtocolVariant,
    pub sender: SenderId,
    pub previous_signature: Option<Vec<u8>>,
    pub info: KeyInfo,
    pub signature: Vec<u8>,
}

impl KeyRegistration {
    /// Index of the signature element in the top-level array
    pub fn signature_index(&self) -> usize {
        self.variant.layout().signature
    }
}

impl TryFrom<Envelope> for KeyRegistration {
    type Error = BridgeError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        if !envelope.is_key_registration() {
            return Err(mismatch(format!(
                "{}: {:#04x}",
                constants::ERR_NOT_REGISTRATION,
                envelope.payload_type
            )));
        }
        let info = KeyInfo::from_payload(&envelope.payload)?;
        Ok(Self {
            variant: envelope.variant,
            sender: envelope.sender,
            previous_signature: envelope.previous_signature,
            info,
            signature: envelope.signature,
        })
    }
}

/// Interpret a decoded frame as a key registration.
///
/// # Errors
/// Returns `BridgeError::SchemaMismatch` when the value is not a known envelope,
/// carries another payload type, or its payload lacks a required field.
pub fn interpret(value: DecodedValue) -> Result<KeyRegistration> {
    Envelope::parse(value).and_then(KeyRegistration::try_from)
}
