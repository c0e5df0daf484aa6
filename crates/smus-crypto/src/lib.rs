//! SMUS Blowfish Variant
//!
//! The non-standard Blowfish cipher used by the Shockwave Multiuser Server
//! (SMUS) wire protocol for the initial login payload. The round function
//! runs the Blowfish "decrypt" key schedule direction; the CBC step derives
//! the next keystream block by applying that round function to the current
//! `iv` and XOR-ing it with the plaintext; tail bytes shorter than a full
//! block are space-padded before being run through the cipher and only
//! their original length is emitted. Encryption and decryption are
//! therefore the same operation - see [`cipher::MusBlowfish`].
//!
//! # Security
//!
//! This crate does not provide interoperability with canonical Blowfish,
//! nor does it claim the confidentiality properties of a modern AEAD. It
//! exists solely to decode bytes produced by the legacy SMUS client, which
//! predates and deviates from the published Blowfish specification.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod tables;

pub mod cipher;

pub use cipher::{MusBlowfish, PrecomputedTables};
