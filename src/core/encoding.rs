//! # MessagePack Value Codec
//!
//! Decodes MessagePack bytes into a [`DecodedValue`] tree and encodes trees
//! back to bytes. Markers and fixed-width data are read with `rmp::decode`
//! over an `rmp::decode::Bytes` cursor, whose position gives element spans.
//! Every declared body length is checked against the bytes that remain before
//! anything is allocated.
//!
//! ## Legacy raw strings
//! Devices running pre-2013 MessagePack encoders emit binary data (keys, signatures)
//! under the `str` markers. A `str` body that is valid UTF-8 decodes as
//! [`DecodedValue::Text`]; anything else decodes as [`DecodedValue::Bytes`].
//! Use [`DecodedValue::as_bytes`] to read either representation.
//!
//! ## Frames and spans
//! [`decode_frame`] keeps the raw buffer next to the decoded tree and records
//! the byte range of every top-level array element. Signature checks slice the
//! raw bytes with these ranges instead of re-encoding the tree.

use crate::error::{constants, BridgeError, Result};
use rmp::decode::bytes::BytesReadError;
use rmp::decode::{self, Bytes, RmpRead, ValueReadError};
use rmp::Marker;
use std::fmt;
use std::ops::Range;

/// Maximum container nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

/// In-memory MessagePack value
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Nil,
    Bool(bool),
    /// Any signed or unsigned integer width, normalised by value
    Integer(i128),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<DecodedValue>),
    /// Entries in wire order
    Map(Vec<(DecodedValue, DecodedValue)>),
    Ext(i8, Vec<u8>),
}

impl DecodedValue {
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            DecodedValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|n| u64::try_from(n).ok())
    }

    /// Byte view of a byte string or a (legacy raw) text string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::Bytes(b) => Some(b),
            DecodedValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(DecodedValue, DecodedValue)]> {
        match self {
            DecodedValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by string key.
    ///
    /// Keys written as byte strings with the same bytes also match.
    pub fn get(&self, key: &str) -> Option<&DecodedValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_bytes() == Some(key.as_bytes()))
            .map(|(_, v)| v)
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DecodedValue::Nil => "nil",
            DecodedValue::Bool(_) => "bool",
            DecodedValue::Integer(_) => "integer",
            DecodedValue::Float(_) => "float",
            DecodedValue::Bytes(_) => "bytes",
            DecodedValue::Text(_) => "text",
            DecodedValue::Array(_) => "array",
            DecodedValue::Map(_) => "map",
            DecodedValue::Ext(_, _) => "ext",
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Nil => f.write_str("nil"),
            DecodedValue::Bool(b) => write!(f, "{b}"),
            DecodedValue::Integer(n) => write!(f, "{n}"),
            DecodedValue::Float(x) => write!(f, "{x}"),
            DecodedValue::Bytes(b) => write!(f, "h'{}'", hex::encode(b)),
            DecodedValue::Text(s) => write!(f, "{s:?}"),
            DecodedValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            DecodedValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            DecodedValue::Ext(ty, data) => write!(f, "ext({ty}, h'{}')", hex::encode(data)),
        }
    }
}

/// A decoded top-level array kept together with the bytes it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Raw frame bytes exactly as received
    pub raw: Vec<u8>,
    /// Decoded tree (always a `DecodedValue::Array`)
    pub value: DecodedValue,
    /// Byte range of each top-level element within `raw`
    pub spans: Vec<Range<usize>>,
}

impl DecodedFrame {
    /// Encoded length of the element at `index`
    pub fn encoded_len(&self, index: usize) -> Option<usize> {
        self.spans.get(index).map(|span| span.len())
    }
}

/// Decode a complete buffer holding exactly one value.
///
/// # Errors
/// Returns `BridgeError::MalformedEncoding` if the buffer is truncated, uses the
/// reserved tag, declares a length past the end of the buffer, nests deeper
/// than [`MAX_NESTING_DEPTH`], or has bytes left over.
pub fn decode(bytes: &[u8]) -> Result<DecodedValue> {
    let mut reader = Reader::new(bytes);
    let value = reader.value(0)?;
    reader.finish()?;
    Ok(value)
}

/// Decode a frame whose top-level value is an array, recording element spans.
pub fn decode_frame(raw: Vec<u8>) -> Result<DecodedFrame> {
    let (items, spans) = read_frame(&raw)?;
    Ok(DecodedFrame {
        raw,
        value: DecodedValue::Array(items),
        spans,
    })
}

/// Byte ranges of the top-level array elements of `bytes`.
pub fn element_spans(bytes: &[u8]) -> Result<Vec<Range<usize>>> {
    read_frame(bytes).map(|(_, spans)| spans)
}

fn read_frame(bytes: &[u8]) -> Result<(Vec<DecodedValue>, Vec<Range<usize>>)> {
    if bytes.is_empty() {
        return Err(BridgeError::MalformedEncoding(
            constants::ERR_EMPTY_FRAME.to_string(),
        ));
    }

    let mut reader = Reader::new(bytes);
    let len = decode::read_array_len(&mut reader.rd).map_err(|e| match e {
        ValueReadError::TypeMismatch(_) => {
            BridgeError::MalformedEncoding(constants::ERR_NOT_AN_ARRAY.to_string())
        }
        other => read_err(other),
    })? as usize;

    let mut items = Vec::with_capacity(len.min(reader.remaining()));
    let mut spans = Vec::with_capacity(len.min(reader.remaining()));
    for _ in 0..len {
        let start = reader.position();
        items.push(reader.value(1)?);
        spans.push(start..reader.position());
    }
    reader.finish()?;

    Ok((items, spans))
}

/// Encode a value to MessagePack using the most compact representation.
///
/// # Errors
/// Returns `BridgeError::EncodeFailure` for integers outside the u64/i64
/// range or containers longer than `u32::MAX`.
pub fn encode(value: &DecodedValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Append an array header for `len` elements to `out`.
pub fn write_array_header(out: &mut Vec<u8>, len: usize) -> Result<()> {
    rmp::encode::write_array_len(out, container_len(len)?).map_err(encode_err)?;
    Ok(())
}

/// Append the encoding of `value` to `out`.
pub fn encode_into(value: &DecodedValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        DecodedValue::Nil => rmp::encode::write_nil(out).map_err(encode_err)?,
        DecodedValue::Bool(b) => rmp::encode::write_bool(out, *b).map_err(encode_err)?,
        DecodedValue::Integer(n) => {
            if *n >= 0 {
                let v = u64::try_from(*n).map_err(encode_err)?;
                rmp::encode::write_uint(out, v).map_err(encode_err)?;
            } else {
                let v = i64::try_from(*n).map_err(encode_err)?;
                rmp::encode::write_sint(out, v).map_err(encode_err)?;
            }
        }
        DecodedValue::Float(x) => rmp::encode::write_f64(out, *x).map_err(encode_err)?,
        DecodedValue::Bytes(b) => rmp::encode::write_bin(out, b).map_err(encode_err)?,
        DecodedValue::Text(s) => rmp::encode::write_str(out, s).map_err(encode_err)?,
        DecodedValue::Array(items) => {
            rmp::encode::write_array_len(out, container_len(items.len())?).map_err(encode_err)?;
            for item in items {
                encode_into(item, out)?;
            }
        }
        DecodedValue::Map(entries) => {
            rmp::encode::write_map_len(out, container_len(entries.len())?).map_err(encode_err)?;
            for (k, v) in entries {
                encode_into(k, out)?;
                encode_into(v, out)?;
            }
        }
        DecodedValue::Ext(ty, data) => {
            rmp::encode::write_ext_meta(out, container_len(data.len())?, *ty)
                .map_err(encode_err)?;
            out.extend_from_slice(data);
        }
    }
    Ok(())
}

fn container_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(encode_err)
}

fn encode_err<E: fmt::Display>(e: E) -> BridgeError {
    BridgeError::EncodeFailure(e.to_string())
}

fn read_err(e: ValueReadError<BytesReadError>) -> BridgeError {
    match e {
        ValueReadError::InvalidMarkerRead(e) | ValueReadError::InvalidDataRead(e) => {
            BridgeError::MalformedEncoding(format!("{}: {e}", constants::ERR_TRUNCATED))
        }
        ValueReadError::TypeMismatch(marker) => {
            BridgeError::MalformedEncoding(format!("unexpected marker {marker:?}"))
        }
    }
}

/// Value reader over `rmp::decode::Bytes`, tracking nesting depth
struct Reader<'a> {
    rd: Bytes<'a>,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { rd: Bytes::new(buf) }
    }

    fn position(&self) -> usize {
        self.rd.position() as usize
    }

    fn remaining(&self) -> usize {
        self.rd.remaining_slice().len()
    }

    fn finish(&self) -> Result<()> {
        if self.remaining() > 0 {
            return Err(BridgeError::MalformedEncoding(format!(
                "{} ({} bytes)",
                constants::ERR_TRAILING_BYTES,
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Copy out a body of `len` bytes, refusing lengths past the end of the buffer
    fn take(&mut self, len: u32) -> Result<Vec<u8>> {
        let len = len as usize;
        if len > self.remaining() {
            return Err(BridgeError::MalformedEncoding(format!(
                "{}: need {len} bytes at offset {}, {} remain",
                constants::ERR_TRUNCATED,
                self.position(),
                self.remaining()
            )));
        }
        let mut body = vec![0; len];
        self.rd
            .read_exact_buf(&mut body)
            .map_err(|e| read_err(ValueReadError::InvalidDataRead(e)))?;
        Ok(body)
    }

    /// Body length declared by a str, bin, array, map or ext marker
    fn length(&mut self, marker: Marker) -> Result<u32> {
        let len = match marker {
            Marker::FixStr(n) | Marker::FixArray(n) | Marker::FixMap(n) => n.into(),
            Marker::FixExt1 => 1,
            Marker::FixExt2 => 2,
            Marker::FixExt4 => 4,
            Marker::FixExt8 => 8,
            Marker::FixExt16 => 16,
            Marker::Str8 | Marker::Bin8 | Marker::Ext8 => {
                self.rd.read_data_u8().map_err(read_err)?.into()
            }
            Marker::Str16 | Marker::Bin16 | Marker::Array16 | Marker::Map16 | Marker::Ext16 => {
                self.rd.read_data_u16().map_err(read_err)?.into()
            }
            Marker::Str32 | Marker::Bin32 | Marker::Array32 | Marker::Map32 | Marker::Ext32 => {
                self.rd.read_data_u32().map_err(read_err)?
            }
            other => return Err(read_err(ValueReadError::TypeMismatch(other))),
        };
        Ok(len)
    }

    fn value(&mut self, depth: usize) -> Result<DecodedValue> {
        let marker = decode::read_marker(&mut self.rd).map_err(|e| read_err(e.into()))?;
        let value = match marker {
            Marker::Null => DecodedValue::Nil,
            Marker::True => DecodedValue::Bool(true),
            Marker::False => DecodedValue::Bool(false),
            Marker::FixPos(n) => DecodedValue::Integer(n.into()),
            Marker::FixNeg(n) => DecodedValue::Integer(n.into()),
            Marker::U8 => DecodedValue::Integer(self.rd.read_data_u8().map_err(read_err)?.into()),
            Marker::U16 => DecodedValue::Integer(self.rd.read_data_u16().map_err(read_err)?.into()),
            Marker::U32 => DecodedValue::Integer(self.rd.read_data_u32().map_err(read_err)?.into()),
            Marker::U64 => DecodedValue::Integer(self.rd.read_data_u64().map_err(read_err)?.into()),
            Marker::I8 => DecodedValue::Integer(self.rd.read_data_i8().map_err(read_err)?.into()),
            Marker::I16 => DecodedValue::Integer(self.rd.read_data_i16().map_err(read_err)?.into()),
            Marker::I32 => DecodedValue::Integer(self.rd.read_data_i32().map_err(read_err)?.into()),
            Marker::I64 => DecodedValue::Integer(self.rd.read_data_i64().map_err(read_err)?.into()),
            Marker::F32 => DecodedValue::Float(self.rd.read_data_f32().map_err(read_err)?.into()),
            Marker::F64 => DecodedValue::Float(self.rd.read_data_f64().map_err(read_err)?),
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len = self.length(marker)?;
                text(self.take(len)?)
            }
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
                let len = self.length(marker)?;
                DecodedValue::Bytes(self.take(len)?)
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = self.length(marker)?;
                self.array_body(len as usize, depth)?
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len = self.length(marker)?;
                self.map_body(len as usize, depth)?
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => {
                let len = self.length(marker)?;
                let ty = self.rd.read_data_i8().map_err(read_err)?;
                DecodedValue::Ext(ty, self.take(len)?)
            }
            Marker::Reserved => {
                return Err(BridgeError::MalformedEncoding(
                    constants::ERR_RESERVED_MARKER.to_string(),
                ))
            }
        };
        Ok(value)
    }

    fn enter(&self, depth: usize) -> Result<usize> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(BridgeError::MalformedEncoding(
                constants::ERR_NESTING_TOO_DEEP.to_string(),
            ));
        }
        Ok(depth + 1)
    }

    fn array_body(&mut self, len: usize, depth: usize) -> Result<DecodedValue> {
        let depth = self.enter(depth)?;
        // every element takes at least one byte
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.value(depth)?);
        }
        Ok(DecodedValue::Array(items))
    }

    fn map_body(&mut self, len: usize, depth: usize) -> Result<DecodedValue> {
        let depth = self.enter(depth)?;
        let mut entries = Vec::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = self.value(depth)?;
            let value = self.value(depth)?;
            entries.push((key, value));
        }
        Ok(DecodedValue::Map(entries))
    }
}

/// `str` bodies that are not UTF-8 are legacy raw binary
fn text(body: Vec<u8>) -> DecodedValue {
    match String::from_utf8(body) {
        Ok(s) => DecodedValue::Text(s),
        Err(e) => DecodedValue::Bytes(e.into_bytes()),
    }
}
