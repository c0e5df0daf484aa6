//! Fuzz target for `MusBlowfish` buffer encode/decode.
//!
//! The cipher has no invalid input (every byte buffer is accepted), so
//! this target isn't hunting for rejected input. It is checking that
//! `decode(encode(buf))` round-trips for any key and any buffer length,
//! and that neither direction panics.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use smus_crypto::MusBlowfish;

#[derive(Debug, Arbitrary)]
struct Input {
    key: Vec<u8>,
    buffer: Vec<u8>,
}

fuzz_target!(|input: Input| {
    if input.key.is_empty() {
        return;
    }

    let mut encoder = MusBlowfish::new_keyed(&input.key);
    let mut decoder = MusBlowfish::new_keyed(&input.key);

    let original = input.buffer.clone();
    let mut buf = input.buffer;

    encoder.encode(&mut buf);
    assert_eq!(buf.len(), original.len());

    decoder.decode(&mut buf);
    assert_eq!(buf, original);
});
