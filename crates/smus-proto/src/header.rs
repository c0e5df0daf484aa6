//! Length-prefixed header strings and string lists shared by the MUS
//! framer's fixed-field section (`Subject`, `SenderID`, `recipients`).
//!
//! # Invariants
//!
//! - A declared length `L` is always followed by exactly `L` payload bytes
//!   and, when `L` is odd, one zero-padding byte so the next field starts
//!   at an even offset relative to the string's own start.

use bytes::BufMut;

use crate::errors::ProtocolError;

/// One length-prefixed, odd-padded ASCII/UTF-8 string from a MUS header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusHeaderString {
    /// The declared length on the wire (before odd-padding).
    pub length: usize,
    /// The decoded text.
    pub value: String,
}

impl MusHeaderString {
    /// Parse one header string starting at `offset`. Returns the string and
    /// the total bytes consumed (length prefix, payload, and odd-pad byte
    /// if any).
    pub fn parse(buf: &[u8], offset: usize) -> Result<(Self, usize), ProtocolError> {
        require(buf, offset, 4)?;
        let raw_len = i32::from_be_bytes(
            buf[offset..offset + 4].try_into().unwrap_or_default(),
        );
        if raw_len < 0 {
            return Err(ProtocolError::NegativeLength { field: "header string length", value: raw_len });
        }
        let length = raw_len as usize;

        let start = offset + 4;
        require(buf, start, length)?;
        let value = String::from_utf8_lossy(&buf[start..start + length]).into_owned();

        let mut consumed = 4 + length;
        if length % 2 != 0 {
            consumed += 1;
        }

        Ok((Self { length, value }, consumed))
    }

    /// Encode this string back to the wire format, including odd-pad.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let bytes = self.value.as_bytes();
        dst.put_u32(bytes.len() as u32);
        dst.put_slice(bytes);
        if bytes.len() % 2 != 0 {
            dst.put_u8(0);
        }
    }
}

impl From<&str> for MusHeaderString {
    fn from(value: &str) -> Self {
        Self { length: value.len(), value: value.to_string() }
    }
}

/// A count-prefixed run of [`MusHeaderString`]s (the recipient list).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MusHeaderStringList {
    /// The strings, in wire order.
    pub strings: Vec<MusHeaderString>,
}

impl MusHeaderStringList {
    /// Parse a count followed by that many header strings.
    pub fn parse(buf: &[u8], offset: usize) -> Result<(Self, usize), ProtocolError> {
        require(buf, offset, 4)?;
        let raw_count = i32::from_be_bytes(
            buf[offset..offset + 4].try_into().unwrap_or_default(),
        );
        if raw_count < 0 {
            return Err(ProtocolError::NegativeLength { field: "recipient count", value: raw_count });
        }
        let count = raw_count as usize;

        let mut strings = Vec::with_capacity(count.min(4096));
        let mut cursor = offset + 4;
        for _ in 0..count {
            let (s, consumed) = MusHeaderString::parse(buf, cursor)?;
            cursor += consumed;
            strings.push(s);
        }

        Ok((Self { strings }, cursor - offset))
    }

    /// Encode the count followed by each string.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32(self.strings.len() as u32);
        for s in &self.strings {
            s.encode(dst);
        }
    }
}

fn require(buf: &[u8], offset: usize, needed: usize) -> Result<(), ProtocolError> {
    let fits = matches!(offset.checked_add(needed), Some(end) if end <= buf.len());
    if !fits {
        return Err(ProtocolError::Truncated { needed: offset + needed, available: buf.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_length_string_round_trips() {
        let (s, consumed) = MusHeaderString::parse(b"\x00\x00\x00\x04Ping", 0).unwrap();
        assert_eq!(s.value, "Ping");
        assert_eq!(consumed, 8);

        let mut buf = Vec::new();
        s.encode(&mut buf);
        assert_eq!(buf, b"\x00\x00\x00\x04Ping");
    }

    #[test]
    fn odd_length_string_is_padded() {
        let raw = b"\x00\x00\x00\x03abc\x00trailing";
        let (s, consumed) = MusHeaderString::parse(raw, 0).unwrap();
        assert_eq!(s.value, "abc");
        assert_eq!(consumed, 8);
        assert_eq!(&raw[consumed..], b"trailing");
    }

    #[test]
    fn empty_string_round_trips() {
        let (s, consumed) = MusHeaderString::parse(b"\x00\x00\x00\x00", 0).unwrap();
        assert_eq!(s.value, "");
        assert_eq!(consumed, 4);
    }

    #[test]
    fn string_list_preserves_order() {
        let mut buf = Vec::new();
        buf.put_u32(2);
        MusHeaderString::from("alice").encode(&mut buf);
        MusHeaderString::from("bob").encode(&mut buf);

        let (list, consumed) = MusHeaderStringList::parse(&buf, 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(list.strings[0].value, "alice");
        assert_eq!(list.strings[1].value, "bob");
    }

    #[test]
    fn truncated_string_is_truncated_error() {
        let raw = b"\x00\x00\x00\x10short";
        assert_eq!(
            MusHeaderString::parse(raw, 0),
            Err(ProtocolError::Truncated { needed: 20, available: raw.len() })
        );
    }
}
