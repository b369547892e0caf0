//! # Core Codec Components
//!
//! Byte-level handling: the MessagePack codec for frames and the line codec
//! that splits the device stream into text lines.
//!
//! ## Components
//! - **Encoding**: MessagePack decode/encode into [`encoding::DecodedValue`],
//!   with the raw bytes and element spans kept alongside
//! - **Line Codec**: Tokio codec for newline-delimited text over byte streams
//!
//! ## Wire Format
//! ```text
//! line:  <hex of one MessagePack array> "\r\n"
//! frame: [tag, sender, ..., payload, signature]
//! ```
//!
//! ## Security
//! - Declared lengths are checked against the remaining buffer before allocation
//! - Container nesting is bounded
//! - Inbound lines are bounded; overlong lines are dropped, not buffered

pub mod encoding;
pub mod line_codec;
