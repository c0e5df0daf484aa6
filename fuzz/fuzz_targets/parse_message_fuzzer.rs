//! Fuzz target for `parse_message`.
//!
//! Exercises the full MUS framer: magic/length validation, header string
//! extraction, recipient list, and Lingo parsing of the tail, against
//! arbitrary bytes. Should never panic; every malformed input must return
//! `Err`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use smus_proto::{parse_message, DispatchTable};

fuzz_target!(|data: &[u8]| {
    let table = DispatchTable::default();
    let _ = parse_message(data, &table, None);
});
