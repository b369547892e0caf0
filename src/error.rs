//! # Error Types
//!
//! Error handling for the commissioning bridge.
//!
//! This module defines every error variant that can surface while a line is
//! read, decoded, interpreted, or verified, plus the transport and
//! configuration failures around that loop.
//!
//! ## Error Categories
//! - **Codec Errors**: truncated or invalid MessagePack bytes, bad hex
//! - **Schema Errors**: decodable values that are not a known message shape
//! - **Verification Errors**: well-formed registrations whose signature fails
//! - **Transport Errors**: end of stream, idle timeout, link setup failures
//! - **Configuration Errors**: unreadable or invalid configuration
//!
//! Codec and schema errors are per-line: the bridge reports them and keeps
//! reading. `TransportClosed` is the normal end of a session.
//!
//! ## Example Usage
//! ```rust
//! use keyreg_bridge::core::encoding::decode;
//! use keyreg_bridge::error::BridgeError;
//!
//! match decode(&[0x92, 0x01]) {
//!     Err(BridgeError::MalformedEncoding(reason)) => println!("bad frame: {reason}"),
//!     other => println!("unexpected: {other:?}"),
//! }
//! ```

use crate::protocol::verifier::InvalidReason;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Codec errors
    pub const ERR_TRUNCATED: &str = "buffer truncated";
    pub const ERR_RESERVED_MARKER: &str = "reserved type tag 0xc1";
    pub const ERR_TRAILING_BYTES: &str = "trailing bytes after top-level value";
    pub const ERR_NESTING_TOO_DEEP: &str = "nesting depth limit exceeded";
    pub const ERR_EMPTY_FRAME: &str = "empty frame";
    pub const ERR_NOT_AN_ARRAY: &str = "top-level value is not an array";

    /// Schema errors
    pub const ERR_UNKNOWN_VARIANT: &str = "unknown message type tag";
    pub const ERR_NOT_REGISTRATION: &str = "payload type is not a key registration";

    /// Transport errors
    pub const ERR_CONNECTION_CLOSED: &str = "Transport closed";
    pub const ERR_UNKNOWN_ENDPOINT: &str = "Unknown endpoint scheme";
    pub const ERR_UNSUPPORTED_BAUD: &str = "Unsupported baud rate";
}

/// BridgeError is the primary error type for all bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(InvalidReason),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Transport timed out after {0:?} without a line")]
    TransportTimeout(Duration),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BridgeError {
    /// Short, stable label used in operator output and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Io(_) => "Io",
            BridgeError::MalformedEncoding(_) => "MalformedEncoding",
            BridgeError::EncodeFailure(_) => "EncodeFailure",
            BridgeError::SchemaMismatch(_) => "SchemaMismatch",
            BridgeError::VerificationFailed(_) => "VerificationFailed",
            BridgeError::TransportClosed => "TransportClosed",
            BridgeError::TransportTimeout(_) => "TransportTimeout",
            BridgeError::TransportError(_) => "TransportError",
            BridgeError::ConfigError(_) => "ConfigError",
        }
    }
}

/// Type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
