//! The MUS framer: validates the fixed header, extracts the header strings
//! and recipient list, and dispatches the payload tail to the cipher (when
//! the subject calls for it) and then to the Lingo codec.
//!
//! # Invariants
//!
//! - [`parse_message`] never reads past `buf`'s end; any attempt is a
//!   [`ProtocolError::Truncated`] or [`ProtocolError::LingoBounds`].
//! - The framer is stateless across messages. The cipher it may delegate to
//!   is not: callers must feed every encrypted-subject tail on one
//!   connection through the same [`smus_crypto::MusBlowfish`] instance, in
//!   arrival order, since its internal `iv` advances with each block.

use std::collections::HashMap;

use smus_crypto::MusBlowfish;
use tracing::warn;

use crate::{
    errors::ProtocolError,
    header::{MusHeaderString, MusHeaderStringList},
    lingo::{self, LingoValue},
};

const MAGIC: [u8; 2] = [0x72, 0x00];
/// Bytes of fixed framing preceding `content_size`'s own 4 bytes
/// (magic + `content_size`).
const HEADER_PREFIX: usize = 6;
/// The 20-byte constant SMUS appends to keys shorter than it (the original
/// "IPAddress resolution" padding rule).
const SHORT_KEY_PADDING: &str = "IPAddress resolution";
/// Minimum key length before the padding rule no longer applies.
const MIN_KEY_LEN: usize = 20;
/// Sentinel key value that disables encryption outright.
const NO_ENCRYPTION_TAG: &str = "#NoEncryption";

/// A fully decoded MUS message.
#[derive(Debug, Clone, PartialEq)]
pub struct MusMessage {
    /// Bytes of payload following the `content_size` field itself.
    pub content_size: i32,
    /// Opaque application error code.
    pub err_code: i32,
    /// Opaque timestamp.
    pub timestamp: i32,
    /// Message subject; selected values drive payload decoding.
    pub subject: String,
    /// Sender identifier.
    pub sender_id: String,
    /// Recipient identifiers.
    pub recipients: Vec<String>,
    /// The tail bytes as received, present when the subject did not select
    /// cipher decoding.
    pub raw_payload: Option<Vec<u8>>,
    /// The tail bytes after cipher decoding, present when the subject did
    /// select it and a cipher was available.
    pub decoded_payload: Option<Vec<u8>>,
    /// The Lingo value tree parsed from whichever of the two tails above
    /// was used (or `Void` if the tail was empty).
    pub parsed_payload: LingoValue,
}

/// Maps a message `Subject` to whether its payload tail should be routed
/// through the cipher before Lingo parsing.
///
/// Defaults to the one mapping the source exercises: `"Logon"` selects
/// decoding. Extend with [`Self::insert`] for additional subjects.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    decode_subjects: HashMap<String, bool>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        let mut decode_subjects = HashMap::new();
        decode_subjects.insert("Logon".to_string(), true);
        Self { decode_subjects }
    }
}

impl DispatchTable {
    /// Map `subject` to `decode`. `true` routes the tail through the
    /// cipher (when one is configured); `false` is equivalent to no entry.
    pub fn insert(&mut self, subject: impl Into<String>, decode: bool) {
        self.decode_subjects.insert(subject.into(), decode);
    }

    /// Whether `subject` selects cipher decoding.
    #[must_use]
    pub fn should_decode(&self, subject: &str) -> bool {
        self.decode_subjects.get(subject).copied().unwrap_or(false)
    }
}

/// The encryption key configuration consumed by the framer.
///
/// Either holds a cipher ready to decode dispatch-selected tails, or
/// signals that encryption is disabled entirely (the `#NoEncryption`
/// sentinel), in which case the framer never attempts to decode.
pub enum CipherConfig {
    /// Encryption disabled; dispatch-selected subjects fall through to raw
    /// bytes and surface [`ProtocolError::CipherUnavailable`].
    Disabled,
    /// A keyed cipher, built from `key` via [`Self::from_key`]'s padding
    /// rule.
    Keyed(MusBlowfish),
}

impl CipherConfig {
    /// Build a `CipherConfig` from a user-supplied key string, applying the
    /// short-key padding rule and recognizing the `#NoEncryption` sentinel.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        if key == NO_ENCRYPTION_TAG {
            return Self::Disabled;
        }

        let prepared = if key.len() < MIN_KEY_LEN {
            format!("{key}{SHORT_KEY_PADDING}")
        } else {
            key.to_string()
        };

        Self::Keyed(MusBlowfish::new_keyed(prepared.as_bytes()))
    }

    fn cipher_mut(&mut self) -> Option<&mut MusBlowfish> {
        match self {
            Self::Disabled => None,
            Self::Keyed(cipher) => Some(cipher),
        }
    }
}

/// Parse one received buffer into a [`MusMessage`]: validate the magic and
/// `content_size`, extract the fixed header fields, then dispatch the
/// payload tail to the cipher and Lingo codec. `cipher`, when supplied, is
/// used for subjects the `table`
/// maps to decoding; its `iv` advances across calls, so callers must reuse
/// the same instance for every message on a connection.
pub fn parse_message(
    buf: &[u8],
    table: &DispatchTable,
    cipher: Option<&mut CipherConfig>,
) -> Result<MusMessage, ProtocolError> {
    if buf.len() < 2 || buf[0] != MAGIC[0] || buf[1] != MAGIC[1] {
        let found = [buf.first().copied().unwrap_or(0), buf.get(1).copied().unwrap_or(0)];
        return Err(ProtocolError::InvalidHeader { found });
    }

    let content_size = read_i32(buf, 2, "content_size")?;
    let total_needed = HEADER_PREFIX + usize::try_from(content_size).unwrap_or(usize::MAX);
    if buf.len() < total_needed {
        return Err(ProtocolError::Truncated { needed: total_needed, available: buf.len() });
    }

    let err_code = read_i32(buf, 6, "err_code")?;
    let timestamp = read_i32(buf, 10, "timestamp")?;

    let mut cursor = 14;
    let (subject, consumed) = MusHeaderString::parse(buf, cursor)?;
    cursor += consumed;
    let (sender_id, consumed) = MusHeaderString::parse(buf, cursor)?;
    cursor += consumed;
    let (recipients, consumed) = MusHeaderStringList::parse(buf, cursor)?;
    cursor += consumed;

    let tail_end = total_needed;
    let tail = if cursor < tail_end { &buf[cursor..tail_end] } else { &[][..] };

    let (raw_payload, decoded_payload, parsed_payload) = if tail.is_empty() {
        (None, None, LingoValue::Void)
    } else if table.should_decode(&subject.value) {
        match cipher.and_then(CipherConfig::cipher_mut) {
            Some(cipher) => {
                let mut decoded = tail.to_vec();
                cipher.decode(&mut decoded);
                let (value, _) = lingo::parse(&decoded, 0)?;
                (None, Some(decoded), value)
            },
            None => {
                warn!(
                    subject = %subject.value,
                    error = %ProtocolError::CipherUnavailable,
                    "falling back to raw payload"
                );
                // The tail is still ciphertext; it may not parse as valid
                // Lingo at all (most often it will hit an unrecognized tag
                // and decode as Void). Either way CipherUnavailable already
                // marks this message as best-effort, so a parse failure
                // here falls back to Void rather than aborting the message.
                let value =
                    lingo::parse(tail, 0).map_or(LingoValue::Void, |(value, _)| value);
                (Some(tail.to_vec()), None, value)
            },
        }
    } else {
        let (value, _) = lingo::parse(tail, 0)?;
        (Some(tail.to_vec()), None, value)
    };

    Ok(MusMessage {
        content_size,
        err_code,
        timestamp,
        subject: subject.value,
        sender_id: sender_id.value,
        recipients: recipients.strings.into_iter().map(|s| s.value).collect(),
        raw_payload,
        decoded_payload,
        parsed_payload,
    })
}

fn read_i32(buf: &[u8], offset: usize, field: &'static str) -> Result<i32, ProtocolError> {
    let end = offset + 4;
    if end > buf.len() {
        return Err(ProtocolError::Truncated { needed: end, available: buf.len() });
    }
    let value = i32::from_be_bytes(buf[offset..end].try_into().unwrap_or_default());
    if field == "content_size" && value < 0 {
        return Err(ProtocolError::NegativeLength { field, value });
    }
    Ok(value)
}
