//! SMUS message framing and Lingo value codec.
//!
//! Three things live here:
//!
//! - [`header`] - length-prefixed header strings and string lists shared by
//!   the framer's fixed fields.
//! - [`lingo`] - the tagged, recursive Lingo value codec.
//! - [`message`] - the MUS framer: magic/length validation, header
//!   extraction, and subject-driven dispatch of the payload tail to the
//!   cipher (via [`smus_crypto::MusBlowfish`]) and then to [`lingo`].
//!
//! This crate never opens a socket or owns an accept loop. It is a pure
//! byte-in/value-out parser. The surrounding transport and connection
//! plumbing is left to the caller.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod errors;
pub mod header;
pub mod lingo;
pub mod message;

pub use errors::ProtocolError;
pub use header::{MusHeaderString, MusHeaderStringList};
pub use lingo::LingoValue;
pub use message::{parse_message, CipherConfig, DispatchTable, MusMessage};
