// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::encoding::{decode_frame, element_spans, DecodedValue};
use crate::error::BridgeError;
use crate::protocol::message::{interpret, Envelope, ProtocolVariant, SenderId};
use crate::protocol::signer::{FrameSigner, Validity, ED25519_ALGORITHM};
use crate::protocol::verifier::*;
use crate::REFERENCE_REGISTRATION_HEX;

const REFERENCE_PUB_KEY: &str = "67bf98685f6d9cbc93e18372521cbdaa2b4b18b9fdb6d0dd8f7d1df43d6bacc3";
const REFERENCE_DEVICE_ID: &str = "00000000000000000000000039b29abc";
const REFERENCE_DIGEST_PREFIX: &str = "00d1a059";
const CREATED: i64 = 0x5b0e_f871;
const VALID_NOT_AFTER: i64 = 0x5cf0_2bf0;

fn reference_raw() -> Vec<u8> {
    hex::decode(REFERENCE_REGISTRATION_HEX).expect("reference hex")
}

/// Decode, interpret and verify; any failure before verification counts as not valid.
fn check(raw: &[u8]) -> Option<VerificationResult> {
    let frame = decode_frame(raw.to_vec()).ok()?;
    let registration = interpret(frame.value).ok()?;
    Some(verify(raw, &registration))
}

fn test_signer() -> FrameSigner {
    FrameSigner::from_secret_key([7u8; 32])
}

fn validity() -> Validity {
    Validity {
        created: CREATED,
        not_before: CREATED,
        not_after: VALID_NOT_AFTER,
    }
}

fn text(s: &str) -> DecodedValue {
    DecodedValue::Text(s.to_string())
}

fn registration_payload(algorithm: &str, pub_key: &[u8]) -> DecodedValue {
    DecodedValue::Map(vec![
        (text("algorithm"), text(algorithm)),
        (text("created"), DecodedValue::Integer(CREATED.into())),
        (text("hwDeviceId"), DecodedValue::Bytes(vec![0xab; 16])),
        (text("pubKey"), DecodedValue::Bytes(pub_key.to_vec())),
        (text("validNotAfter"), DecodedValue::Integer(VALID_NOT_AFTER.into())),
    ])
}

#[test]
fn test_reference_registration_is_valid() {
    let raw = reference_raw();
    assert_eq!(raw.len(), 234);

    let frame = decode_frame(raw.clone()).expect("decode");
    let registration = interpret(frame.value).expect("interpret");

    assert_eq!(registration.variant, ProtocolVariant::Signed);
    assert_eq!(registration.info.algorithm, "ECC_ED25519");
    assert_eq!(hex::encode(&registration.info.pub_key), REFERENCE_PUB_KEY);
    assert_eq!(hex::encode(&registration.info.device_id), REFERENCE_DEVICE_ID);
    assert_eq!(
        registration.sender,
        SenderId::Bytes(hex::decode(REFERENCE_DEVICE_ID).unwrap())
    );
    assert_eq!(registration.info.created, CREATED);
    assert_eq!(registration.info.valid_not_before, Some(CREATED));
    assert_eq!(registration.info.valid_not_after, VALID_NOT_AFTER);
    assert_eq!(registration.signature.len(), 64);

    assert_eq!(verify(&raw, &registration), VerificationResult::Valid);
}

#[test]
fn test_reference_signed_prefix_excludes_67_bytes() {
    let raw = reference_raw();
    let prefix = signed_prefix(&raw, 4).expect("prefix");
    assert_eq!(prefix.len(), raw.len() - 67);
    assert_eq!(prefix.len(), 167);
    assert!(hex::encode(message_digest(prefix)).starts_with(REFERENCE_DIGEST_PREFIX));
}

#[test]
fn test_signed_prefix_stable_across_field_values() {
    let raw = reference_raw();
    let pub_key = hex::decode(REFERENCE_PUB_KEY).unwrap();
    let device_id = hex::decode(REFERENCE_DEVICE_ID).unwrap();

    let mut mutated = raw.clone();
    let replace_all = |buf: &mut Vec<u8>, needle: &[u8], fill: u8| {
        let mut start = 0;
        while let Some(pos) = buf[start..].windows(needle.len()).position(|w| w == needle) {
            let at = start + pos;
            buf[at..at + needle.len()].fill(fill);
            start = at + needle.len();
        }
    };
    replace_all(&mut mutated, &pub_key, 0xee);
    replace_all(&mut mutated, &device_id, 0x11);
    assert_ne!(mutated, raw);

    let original = signed_prefix(&raw, 4).unwrap().len();
    assert_eq!(signed_prefix(&mutated, 4).unwrap().len(), original);

    // Same boundary, different bytes: the signature no longer matches
    assert!(!check(&mutated).expect("still decodes").is_valid());
}

#[test]
fn test_any_signature_bit_flip_is_invalid() {
    let raw = reference_raw();
    for byte in raw.len() - 64..raw.len() {
        for bit in 0..8 {
            let mut flipped = raw.clone();
            flipped[byte] ^= 1 << bit;
            let verdict = check(&flipped).expect("signature flips still decode");
            assert!(
                !verdict.is_valid(),
                "flip at byte {byte} bit {bit} verified"
            );
        }
    }
}

#[test]
fn test_any_prefix_bit_flip_is_not_valid() {
    let raw = reference_raw();
    for byte in 0..167 {
        for bit in 0..8 {
            let mut flipped = raw.clone();
            flipped[byte] ^= 1 << bit;
            let valid = check(&flipped).is_some_and(|verdict| verdict.is_valid());
            assert!(!valid, "flip at byte {byte} bit {bit} verified");
        }
    }
}

#[test]
fn test_verification_is_deterministic() {
    let raw = reference_raw();
    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();
    let first = verify(&raw, &registration);
    for _ in 0..10 {
        assert_eq!(verify(&raw, &registration), first);
    }
}

#[test]
fn test_registration_against_foreign_bytes_is_frame_mismatch() {
    let raw = reference_raw();
    let registration = interpret(decode_frame(raw).unwrap().value).unwrap();

    let other = test_signer()
        .key_registration(&[0x42; 16], validity())
        .unwrap();
    assert_eq!(
        verify(&other, &registration),
        VerificationResult::Invalid(InvalidReason::FrameMismatch)
    );
}

#[test]
fn test_signer_output_verifies_with_bin8_signature() {
    let signer = test_signer();
    let raw = signer.key_registration(&[0x42; 16], validity()).unwrap();

    let spans = element_spans(&raw).unwrap();
    assert_eq!(spans.len(), 5);
    // bin8 marker + length + 64 bytes
    assert_eq!(spans[4].len(), 66);
    assert_eq!(signed_prefix(&raw, 4).unwrap().len(), raw.len() - 66);

    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();
    assert_eq!(registration.info.pub_key, signer.public_key().to_vec());
    assert_eq!(registration.info.algorithm, ED25519_ALGORITHM);
    assert_eq!(verify(&raw, &registration), VerificationResult::Valid);
}

#[test]
fn test_chained_registration_verifies() {
    let signer = test_signer();
    let first = signer.key_registration(&[0x42; 16], validity()).unwrap();
    let previous = interpret(decode_frame(first).unwrap().value).unwrap().signature;

    let raw = signer
        .chained(
            &[0x42; 16],
            &previous,
            1,
            registration_payload("ECC_ED25519", &signer.public_key()),
        )
        .unwrap();
    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();

    assert_eq!(registration.variant, ProtocolVariant::Chained);
    assert_eq!(registration.signature_index(), 5);
    assert_eq!(registration.previous_signature.as_deref(), Some(previous.as_slice()));
    assert_eq!(verify(&raw, &registration), VerificationResult::Valid);
}

#[test]
fn test_chained_message_envelope() {
    let raw = test_signer()
        .chained(&[0x42; 16], &[0u8; 64], 0x32, DecodedValue::Integer(99))
        .unwrap();
    let envelope = Envelope::parse(decode_frame(raw).unwrap().value).unwrap();

    assert_eq!(envelope.variant, ProtocolVariant::Chained);
    assert_eq!(envelope.payload_type, 0x32);
    assert_eq!(envelope.payload, DecodedValue::Integer(99));
    assert!(!envelope.is_key_registration());
}

#[test]
fn test_unsupported_algorithm() {
    let signer = test_signer();
    let raw = signer
        .sign_elements(&[
            DecodedValue::Integer(0x12),
            DecodedValue::Bytes(vec![0x42; 16]),
            DecodedValue::Integer(1),
            registration_payload("ECC_NIST256P1", &signer.public_key()),
        ])
        .unwrap();
    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();

    assert_eq!(
        verify(&raw, &registration),
        VerificationResult::Invalid(InvalidReason::UnsupportedAlgorithm(
            "ECC_NIST256P1".to_string()
        ))
    );
}

#[test]
fn test_algorithm_name_variants() {
    assert_eq!(SignatureScheme::from_name("ECC_ED25519"), Some(SignatureScheme::Ed25519));
    assert_eq!(SignatureScheme::from_name("Ed25519"), Some(SignatureScheme::Ed25519));
    assert_eq!(SignatureScheme::from_name("ecc_ed25519 "), Some(SignatureScheme::Ed25519));
    assert_eq!(SignatureScheme::from_name("ECC_ECDSA"), None);
}

#[test]
fn test_wrong_public_key_length() {
    let raw = test_signer()
        .sign_elements(&[
            DecodedValue::Integer(0x12),
            DecodedValue::Bytes(vec![0x42; 16]),
            DecodedValue::Integer(1),
            registration_payload("ECC_ED25519", &[1u8; 31]),
        ])
        .unwrap();
    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();

    assert_eq!(
        verify(&raw, &registration),
        VerificationResult::Invalid(InvalidReason::PublicKeyLength(31))
    );
}

#[test]
fn test_signature_must_end_frame() {
    let signer = test_signer();
    // The declared signature slot (index 4) holds a dummy; the real one follows
    let raw = signer
        .sign_elements(&[
            DecodedValue::Integer(0x12),
            DecodedValue::Bytes(vec![0x42; 16]),
            DecodedValue::Integer(1),
            registration_payload("ECC_ED25519", &signer.public_key()),
            DecodedValue::Bytes(vec![0u8; 64]),
        ])
        .unwrap();
    let registration = interpret(decode_frame(raw.clone()).unwrap().value).unwrap();

    assert_eq!(
        verify(&raw, &registration),
        VerificationResult::Invalid(InvalidReason::SignatureNotTerminal)
    );
}

#[test]
fn test_short_signature_is_reported() {
    assert_eq!(
        verify_detached(b"prefix", &[0u8; 63], "ECC_ED25519", &hex::decode(REFERENCE_PUB_KEY).unwrap()),
        Err(InvalidReason::SignatureLength(63))
    );
}

#[test]
fn test_validity_window() {
    let raw = reference_raw();
    let registration = interpret(decode_frame(raw).unwrap().value).unwrap();

    assert!(check_validity(&registration.info, CREATED).is_valid());
    assert!(check_validity(&registration.info, VALID_NOT_AFTER).is_valid());
    assert_eq!(
        check_validity(&registration.info, VALID_NOT_AFTER + 1),
        VerificationResult::Invalid(InvalidReason::OutsideValidity {
            now: VALID_NOT_AFTER + 1,
            not_before: Some(CREATED),
            not_after: VALID_NOT_AFTER,
        })
    );
    assert!(!check_validity(&registration.info, CREATED - 1).is_valid());
}

#[test]
fn test_into_result_maps_to_verification_failed() {
    let invalid = VerificationResult::Invalid(InvalidReason::BadSignature);
    assert!(matches!(
        invalid.into_result(),
        Err(BridgeError::VerificationFailed(InvalidReason::BadSignature))
    ));
    assert!(VerificationResult::Valid.into_result().is_ok());
}

#[test]
fn test_schema_rejects_unknown_tag() {
    let value = DecodedValue::Array(vec![
        DecodedValue::Integer(0x14),
        DecodedValue::Integer(1),
        DecodedValue::Integer(1),
        DecodedValue::Map(vec![]),
        DecodedValue::Bytes(vec![0; 64]),
    ]);
    assert!(matches!(interpret(value), Err(BridgeError::SchemaMismatch(_))));
}

#[test]
fn test_schema_rejects_short_array() {
    let value = DecodedValue::Array(vec![DecodedValue::Integer(0x12), DecodedValue::Integer(1)]);
    assert!(matches!(interpret(value), Err(BridgeError::SchemaMismatch(_))));
}

#[test]
fn test_schema_rejects_non_array() {
    assert!(matches!(
        interpret(DecodedValue::Integer(0x12)),
        Err(BridgeError::SchemaMismatch(_))
    ));
}

#[test]
fn test_schema_rejects_missing_and_mistyped_fields() {
    let envelope = |payload: DecodedValue| {
        DecodedValue::Array(vec![
            DecodedValue::Integer(0x12),
            DecodedValue::Integer(7),
            DecodedValue::Integer(1),
            payload,
            DecodedValue::Bytes(vec![0; 64]),
        ])
    };

    let missing_key = DecodedValue::Map(vec![
        (text("algorithm"), text("ECC_ED25519")),
        (text("created"), DecodedValue::Integer(1)),
        (text("hwDeviceId"), DecodedValue::Bytes(vec![1; 16])),
        (text("validNotAfter"), DecodedValue::Integer(2)),
    ]);
    assert!(matches!(
        interpret(envelope(missing_key)),
        Err(BridgeError::SchemaMismatch(reason)) if reason.contains("pubKey")
    ));

    let integer_key = DecodedValue::Map(vec![
        (text("algorithm"), text("ECC_ED25519")),
        (text("created"), DecodedValue::Integer(1)),
        (text("hwDeviceId"), DecodedValue::Bytes(vec![1; 16])),
        (text("pubKey"), DecodedValue::Integer(5)),
        (text("validNotAfter"), DecodedValue::Integer(2)),
    ]);
    assert!(matches!(
        interpret(envelope(integer_key)),
        Err(BridgeError::SchemaMismatch(reason)) if reason.contains("pubKey")
    ));

    assert!(matches!(
        interpret(envelope(DecodedValue::Integer(3))),
        Err(BridgeError::SchemaMismatch(_))
    ));
}

#[test]
fn test_schema_accepts_device_id_alias_and_extra_keys() {
    let payload = DecodedValue::Map(vec![
        (text("pubKey"), DecodedValue::Bytes(vec![9; 32])),
        (text("firmware"), text("1.2.3")),
        (text("validNotAfter"), DecodedValue::Integer(2)),
        (text("deviceId"), DecodedValue::Bytes(vec![1; 16])),
        (text("created"), DecodedValue::Integer(1)),
        (text("algorithm"), text("ECC_ED25519")),
    ]);
    let value = DecodedValue::Array(vec![
        DecodedValue::Integer(0x12),
        DecodedValue::Integer(7),
        DecodedValue::Integer(1),
        payload,
        DecodedValue::Bytes(vec![0; 64]),
        text("trailing element ignored"),
    ]);

    let registration = interpret(value).expect("interpret");
    assert_eq!(registration.sender, SenderId::Integer(7));
    assert_eq!(registration.info.device_id, vec![1; 16]);
    assert_eq!(registration.info.valid_not_before, None);
}

#[test]
fn test_other_payload_type_is_not_a_registration() {
    let value = DecodedValue::Array(vec![
        DecodedValue::Integer(0x12),
        DecodedValue::Integer(7),
        DecodedValue::Integer(0x32),
        DecodedValue::Map(vec![]),
        DecodedValue::Bytes(vec![0; 64]),
    ]);
    assert!(Envelope::parse(value.clone()).is_ok());
    assert!(matches!(interpret(value), Err(BridgeError::SchemaMismatch(_))));
}
