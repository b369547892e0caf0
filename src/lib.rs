//! # keyreg-bridge
//!
//! Host-side commissioning bridge for devices that announce their signing key
//! over a serial line.
//!
//! The device prints text lines. Most are diagnostics; `TIME:` asks the host
//! for the current epoch; lines starting with `95`/`96` are hex-encoded
//! MessagePack frames. At startup the device emits a signed key registration,
//! which the bridge decodes and authenticates: the signature covers
//! `SHA-512` of the raw frame bytes up to the encoded signature, and is checked
//! with Ed25519 against the public key the frame itself carries.
//!
//! ## Layout
//! - [`core`]: MessagePack codec and line framing
//! - [`protocol`]: message schema, verifier, signer, bridge loop
//! - [`transport`]: serial, TCP and Unix socket links
//! - [`utils`]: clock, logging, metrics
//! - [`config`]: TOML / environment configuration
//!
//! ## Example
//! ```rust
//! use keyreg_bridge::core::encoding::decode_frame;
//! use keyreg_bridge::protocol::message::interpret;
//! use keyreg_bridge::protocol::verifier::verify;
//!
//! # fn main() -> keyreg_bridge::error::Result<()> {
//! let raw = hex::decode(keyreg_bridge::REFERENCE_REGISTRATION_HEX)
//!     .map_err(|e| keyreg_bridge::error::BridgeError::MalformedEncoding(e.to_string()))?;
//! let frame = decode_frame(raw)?;
//! let registration = interpret(frame.value.clone())?;
//! assert!(verify(&frame.raw, &registration).is_valid());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::bridge::{LineBridge, LineOutcome};
pub use protocol::message::{interpret, KeyRegistration};
pub use protocol::verifier::{verify, VerificationResult};

/// Key registration printed by a commissioned device at startup: signed
/// variant, ECC_ED25519, 16-byte device UUID.
pub const REFERENCE_REGISTRATION_HEX: &str = concat!(
    "95cd0012b000000000000000000000000039b29abc0186a9616c676f726974686dab4543435f",
    "45443235353139a763726561746564ce5b0ef871aa68774465766963654964b0000000000000",
    "00000000000039b29abca67075624b6579da002067bf98685f6d9cbc93e18372521cbdaa2b4b",
    "18b9fdb6d0dd8f7d1df43d6bacc3ad76616c69644e6f744166746572ce5cf02bf0ae76616c69",
    "644e6f744265666f7265ce5b0ef871da004091d9bb8180e28eba450c81ca6d51eab43716ca2f",
    "752d89eacfea3cadf3b8d4e3f3b6d270b758d058f44f4c19f3edc2741f1a99fcfa5a4bf780c0",
    "d4c671eae109"
);
