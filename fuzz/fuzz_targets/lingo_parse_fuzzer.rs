//! Fuzz target for the Lingo value decoder in isolation.
//!
//! Recursion through `List`/`PropList` makes this the component most at
//! risk of stack exhaustion or out-of-bounds reads on adversarial input;
//! should never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use smus_proto::lingo;

fuzz_target!(|data: &[u8]| {
    let _ = lingo::parse(data, 0);
});
