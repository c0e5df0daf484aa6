//! The Lingo value codec.
//!
//! A recursive, tagged, self-describing binary value format. Every value is
//! a 16-bit big-endian tag followed by a tag-specific body; containers
//! (`List`, `PropList`) own their children outright, so the in-memory tree
//! cannot express the cycles the wire format has no way to encode anyway.
//!
//! # Invariants
//!
//! - [`parse`] never reads past the end of the supplied buffer; any read
//!   that would is a [`ProtocolError::LingoBounds`].
//! - `decode(encode(v)) == v` for every value `parse` can produce (see the
//!   round-trip tests below).
//! - `List` and `PropList` preserve insertion order.

use bytes::{BufMut, Bytes};
use tracing::warn;

use crate::errors::ProtocolError;

const TAG_VOID: u16 = 0;
const TAG_INTEGER: u16 = 1;
const TAG_SYMBOL: u16 = 2;
const TAG_STRING: u16 = 3;
const TAG_FLOAT: u16 = 6;
const TAG_LIST: u16 = 7;
const TAG_PROP_LIST: u16 = 10;
const TAG_MEDIA: u16 = 20;

/// A single Lingo value.
///
/// Tags not in the enumerated set, including the seven reserved-but-never-
/// implemented tags (picture, point, rect, color, date, 3d-vector,
/// 3d-transform), decode as [`LingoValue::Unknown`] and consume only their
/// two tag bytes; the source never defines a body encoding for them, so
/// there is nothing reliable to skip.
#[derive(Debug, Clone, PartialEq)]
pub enum LingoValue {
    /// The empty value. Also the fallback for an unrecognized or
    /// insufficiently-buffered tag.
    Void,
    /// A signed 32-bit integer.
    Integer(i32),
    /// A short identifier-like string, distinguished from `String` only by
    /// its tag.
    Symbol(String),
    /// A general string.
    String(String),
    /// An IEEE-754 double.
    Float(f64),
    /// An ordered sequence of values.
    List(Vec<LingoValue>),
    /// An ordered sequence of (property, value) pairs.
    PropList(Vec<(LingoValue, LingoValue)>),
    /// An opaque byte blob; its length is supplied by the enclosing context
    /// rather than a field of its own, so `parse` treats it as "the rest of
    /// the buffer".
    Media(Bytes),
    /// A tag outside the enumerated set.
    Unknown {
        /// The unrecognized tag value.
        tag: u16,
    },
}

impl LingoValue {
    /// The property lookup used by [`Self::PropList`]: the value paired
    /// with the first property whose [`Self::stringify`] matches `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LingoValue> {
        match self {
            Self::PropList(pairs) => pairs
                .iter()
                .find(|(prop, _)| prop.stringify() == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Positional access into a [`Self::PropList`]'s values.
    #[must_use]
    pub fn get_at(&self, pos: usize) -> Option<&LingoValue> {
        match self {
            Self::PropList(pairs) => pairs.get(pos).map(|(_, value)| value),
            _ => None,
        }
    }

    /// Positional access into a [`Self::PropList`]'s properties.
    #[must_use]
    pub fn prop_at(&self, pos: usize) -> Option<&LingoValue> {
        match self {
            Self::PropList(pairs) => pairs.get(pos).map(|(prop, _)| prop),
            _ => None,
        }
    }

    /// Render a value the way the property-lookup comparison expects:
    /// Symbol and String values stringify to their contained text, other
    /// variants stringify to empty (lookups against them never match).
    fn stringify(&self) -> &str {
        match self {
            Self::Symbol(s) | Self::String(s) => s.as_str(),
            _ => "",
        }
    }
}

/// Parse one tagged value starting at `offset`. Returns the value and the
/// total number of bytes consumed, including the two tag bytes.
pub fn parse(buf: &[u8], offset: usize) -> Result<(LingoValue, usize), ProtocolError> {
    let tag = read_u16(buf, offset)?;
    let (value, body_consumed) = match tag {
        TAG_VOID => (LingoValue::Void, 0),
        TAG_INTEGER => {
            let n = read_i32(buf, offset + 2)?;
            (LingoValue::Integer(n), 4)
        },
        TAG_SYMBOL => {
            let (s, consumed) = parse_padded_string(buf, offset + 2)?;
            (LingoValue::Symbol(s), consumed)
        },
        TAG_STRING => {
            let (s, consumed) = parse_padded_string(buf, offset + 2)?;
            (LingoValue::String(s), consumed)
        },
        TAG_FLOAT => {
            let bits = read_u64(buf, offset + 2)?;
            (LingoValue::Float(f64::from_bits(bits)), 8)
        },
        TAG_LIST => parse_list(buf, offset + 2)?,
        TAG_PROP_LIST => parse_prop_list(buf, offset + 2)?,
        TAG_MEDIA => {
            let rest = &buf[offset + 2..];
            (LingoValue::Media(Bytes::copy_from_slice(rest)), rest.len())
        },
        _ => {
            warn!(error = %ProtocolError::UnknownLingoTag { tag }, "decoding as Void");
            (LingoValue::Unknown { tag }, 0)
        },
    };

    Ok((value, 2 + body_consumed))
}

fn parse_list(buf: &[u8], offset: usize) -> Result<(LingoValue, usize), ProtocolError> {
    let count = read_u32_len(buf, offset, "List.count")?;
    let mut values = Vec::with_capacity(count.min(4096));
    let mut cursor = offset + 4;

    for _ in 0..count {
        let (value, consumed) = parse(buf, cursor)?;
        cursor += consumed;
        values.push(value);
    }

    Ok((LingoValue::List(values), cursor - offset))
}

fn parse_prop_list(buf: &[u8], offset: usize) -> Result<(LingoValue, usize), ProtocolError> {
    let count = read_u32_len(buf, offset, "PropList.count")?;
    let mut pairs = Vec::with_capacity(count.min(4096));
    let mut cursor = offset + 4;

    for _ in 0..count {
        let (property, prop_consumed) = parse(buf, cursor)?;
        cursor += prop_consumed;
        let (value, value_consumed) = parse(buf, cursor)?;
        cursor += value_consumed;
        pairs.push((property, value));
    }

    Ok((LingoValue::PropList(pairs), cursor - offset))
}

/// Read a `u32` length-prefixed string and, when the declared length is
/// odd, one extra zero-padding byte. Applied to both Symbol and String, so
/// a String field never desynchronizes the fields that follow it.
fn parse_padded_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    let len = read_u32_len(buf, offset, "string length")?;
    let start = offset + 4;
    require(buf, start, len)?;
    let text = String::from_utf8_lossy(&buf[start..start + len]).into_owned();
    let padded = len + (len & 1);
    Ok((text, 4 + padded))
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    require(buf, offset, 2)?;
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32, ProtocolError> {
    require(buf, offset, 4)?;
    let bytes: [u8; 4] = buf[offset..offset + 4].try_into().unwrap_or_default();
    Ok(i32::from_be_bytes(bytes))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    require(buf, offset, 8)?;
    let bytes: [u8; 8] = buf[offset..offset + 8].try_into().unwrap_or_default();
    Ok(u64::from_be_bytes(bytes))
}

fn read_u32_len(buf: &[u8], offset: usize, field: &'static str) -> Result<usize, ProtocolError> {
    require(buf, offset, 4)?;
    let bytes: [u8; 4] = buf[offset..offset + 4].try_into().unwrap_or_default();
    let raw = i32::from_be_bytes(bytes);
    if raw < 0 {
        return Err(ProtocolError::NegativeLength { field, value: raw });
    }
    Ok(raw as usize)
}

fn require(buf: &[u8], offset: usize, needed: usize) -> Result<(), ProtocolError> {
    let fits = matches!(offset.checked_add(needed), Some(end) if end <= buf.len());
    if !fits {
        return Err(ProtocolError::LingoBounds { offset, needed, available: buf.len() });
    }
    Ok(())
}

/// Encode a value into `dst`, emitting its tag followed by its body using
/// the same rules `parse` reads them with.
pub fn encode(value: &LingoValue, dst: &mut impl BufMut) {
    match value {
        LingoValue::Void => dst.put_u16(TAG_VOID),
        LingoValue::Integer(n) => {
            dst.put_u16(TAG_INTEGER);
            dst.put_i32(*n);
        },
        LingoValue::Symbol(s) => {
            dst.put_u16(TAG_SYMBOL);
            encode_padded_string(s, dst);
        },
        LingoValue::String(s) => {
            dst.put_u16(TAG_STRING);
            encode_padded_string(s, dst);
        },
        LingoValue::Float(f) => {
            dst.put_u16(TAG_FLOAT);
            dst.put_u64(f.to_bits());
        },
        LingoValue::List(values) => {
            dst.put_u16(TAG_LIST);
            dst.put_u32(values.len() as u32);
            for v in values {
                encode(v, dst);
            }
        },
        LingoValue::PropList(pairs) => {
            dst.put_u16(TAG_PROP_LIST);
            dst.put_u32(pairs.len() as u32);
            for (prop, val) in pairs {
                encode(prop, dst);
                encode(val, dst);
            }
        },
        LingoValue::Media(bytes) => {
            dst.put_u16(TAG_MEDIA);
            dst.put_slice(bytes);
        },
        LingoValue::Unknown { tag } => dst.put_u16(*tag),
    }
}

fn encode_padded_string(s: &str, dst: &mut impl BufMut) {
    let bytes = s.as_bytes();
    dst.put_u32(bytes.len() as u32);
    dst.put_slice(bytes);
    if bytes.len() & 1 == 1 {
        dst.put_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn encoded(value: &LingoValue) -> Vec<u8> {
        let mut buf = Vec::new();
        encode(value, &mut buf);
        buf
    }

    fn round_trip(value: &LingoValue) -> LingoValue {
        let buf = encoded(value);
        let (decoded, consumed) = parse(&buf, 0).expect("parse should succeed");
        assert_eq!(consumed, buf.len());
        decoded
    }

    #[test]
    fn void_round_trips() {
        assert_eq!(round_trip(&LingoValue::Void), LingoValue::Void);
    }

    #[test]
    fn integer_round_trips() {
        let v = LingoValue::Integer(-42);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn symbol_with_odd_length_pads() {
        let v = LingoValue::Symbol("odd".to_string());
        let buf = encoded(&v);
        assert_eq!(buf.len(), 2 + 4 + 3 + 1);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn string_with_odd_length_pads() {
        let v = LingoValue::String("odd".to_string());
        let buf = encoded(&v);
        assert_eq!(buf.len(), 2 + 4 + 3 + 1);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn float_round_trips() {
        let v = LingoValue::Float(3.5);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn list_preserves_order() {
        let v = LingoValue::List(vec![
            LingoValue::Integer(1),
            LingoValue::Integer(2),
            LingoValue::Integer(3),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn prop_list_round_trips_and_supports_lookup() {
        let v = LingoValue::PropList(vec![
            (LingoValue::Symbol("userID".to_string()), LingoValue::String("teste".to_string())),
            (LingoValue::Symbol("password".to_string()), LingoValue::String("teste".to_string())),
            (LingoValue::Symbol("movieID".to_string()), LingoValue::String("faria".to_string())),
        ]);

        let decoded = round_trip(&v);
        assert_eq!(decoded, v);
        assert_eq!(decoded.get("userID"), Some(&LingoValue::String("teste".to_string())));
        assert_eq!(decoded.prop_at(0), Some(&LingoValue::Symbol("userID".to_string())));
        assert_eq!(decoded.get_at(0), Some(&LingoValue::String("teste".to_string())));
    }

    #[test]
    fn unknown_tag_consumes_only_two_bytes() {
        let buf = [0x00, 0x09, 0xFF, 0xFF];
        let (value, consumed) = parse(&buf, 0).expect("parse should succeed");
        assert_eq!(value, LingoValue::Unknown { tag: 9 });
        assert_eq!(consumed, 2);
    }

    #[test]
    fn media_consumes_remainder_of_buffer() {
        let buf = [0x00, 0x14, 0xDE, 0xAD, 0xBE, 0xEF];
        let (value, consumed) = parse(&buf, 0).expect("parse should succeed");
        assert_eq!(value, LingoValue::Media(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn truncated_integer_is_out_of_bounds() {
        let buf = [0x00, 0x01, 0x00, 0x00];
        assert_eq!(
            parse(&buf, 0),
            Err(ProtocolError::LingoBounds { offset: 2, needed: 4, available: 4 })
        );
    }

    #[test]
    fn negative_list_count_is_rejected() {
        let buf = [0x00, 0x07, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            parse(&buf, 0),
            Err(ProtocolError::NegativeLength { field: "List.count", value: -1 })
        );
    }

    proptest! {
        #[test]
        fn integer_round_trip_prop(n in any::<i32>()) {
            prop_assert_eq!(round_trip(&LingoValue::Integer(n)), LingoValue::Integer(n));
        }

        #[test]
        fn float_round_trip_prop(f in any::<u64>().prop_map(f64::from_bits).prop_filter("no NaN", |f| !f.is_nan())) {
            prop_assert_eq!(round_trip(&LingoValue::Float(f)), LingoValue::Float(f));
        }

        #[test]
        fn string_round_trip_prop(s in "[a-zA-Z0-9 ]{0,64}") {
            let v = LingoValue::String(s);
            prop_assert_eq!(round_trip(&v), v);
        }
    }
}
