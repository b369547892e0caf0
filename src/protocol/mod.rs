//! # Protocol Layer
//!
//! Message schema, signature verification and the line bridge that ties them
//! to the device link.
//!
//! ## Components
//! - **Message**: positional envelope layouts and the key registration payload
//! - **Verifier**: SHA-512 over the raw signed prefix, then Ed25519
//! - **Signer**: the device side of the same contract
//! - **Bridge**: per-line classification, time replies, frame reports

pub mod bridge;
pub mod message;
pub mod signer;
pub mod verifier;

#[cfg(test)]
mod tests;
