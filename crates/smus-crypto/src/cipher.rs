//! The stateful MUS Blowfish variant.
//!
//! Standard Blowfish's "decrypt" round function is reused here as the
//! forward CBC step for *both* encoding and decoding: `iv = F(iv); out = in
//! ^ iv`. Because XOR is self-inverse and `F` depends only on the static
//! tables and the prior `iv`, a single operation implements both directions,
//! provided both sides start with the same `iv` and consume blocks in the
//! same order. The cipher is a stateful keystream generator seeded by the
//! initial IV, not a conventional block cipher.
//!
//! # Security
//!
//! This is intentionally *not* interoperable with canonical Blowfish. It
//! exists to decode a legacy wire format, not to provide confidentiality
//! guarantees of its own. Treat it as a fixed, unkeyed-in-the-cryptographic-sense
//! framing transform rather than a cipher offering modern security
//! properties.

use crate::tables::{P_INIT, S1_INIT, S2_INIT, S3_INIT, S4_INIT};

const PBOX_ENTRIES: usize = 18;
const SBOX_ENTRIES: usize = 256;

/// Default padding byte for a short trailing block (ASCII space).
const TAIL_PAD_BYTE: u8 = 0x20;

/// Stateful MUS Blowfish cipher: key-derived tables plus a mutable CBC `iv`.
///
/// # Invariants
///
/// - `pbox` and `sbox1..sbox4` are fixed once constructed ([`Self::new_keyed`]
///   or [`Self::new_precomputed`]); only [`Self::encode`]/[`Self::decode`]
///   mutate `iv`.
/// - `iv` starts at zero and advances by one [`Self::f`] application per
///   8-byte block processed, including the final short block.
#[derive(Clone)]
pub struct MusBlowfish {
    pbox: [u32; PBOX_ENTRIES],
    sbox1: [u32; SBOX_ENTRIES],
    sbox2: [u32; SBOX_ENTRIES],
    sbox3: [u32; SBOX_ENTRIES],
    sbox4: [u32; SBOX_ENTRIES],
    iv: u64,
}

impl MusBlowfish {
    /// Construct a cipher by running the key schedule against `key`.
    ///
    /// `key` must be non-empty; an empty key leaves the static tables
    /// unmixed (the schedule loop is a no-op for `key.len() == 0`), which
    /// this constructor preserves rather than rejecting. Callers that need
    /// short-key padding (the `IPAddress resolution` rule) apply it before
    /// calling this constructor.
    #[must_use]
    pub fn new_keyed(key: &[u8]) -> Self {
        let mut cipher = Self {
            pbox: P_INIT,
            sbox1: S1_INIT,
            sbox2: S2_INIT,
            sbox3: S3_INIT,
            sbox4: S4_INIT,
            iv: 0,
        };

        if !key.is_empty() {
            cipher.mix_key(key);
        }

        cipher
    }

    /// Construct a cipher from an already-derived table set (the
    /// process-wide precomputed tables), skipping the key schedule.
    #[must_use]
    pub fn new_precomputed(tables: &PrecomputedTables) -> Self {
        Self {
            pbox: tables.pbox,
            sbox1: tables.sbox1,
            sbox2: tables.sbox2,
            sbox3: tables.sbox3,
            sbox4: tables.sbox4,
            iv: 0,
        }
    }

    /// Run the Blowfish self-keying loop: XOR `key` cyclically into `pbox`,
    /// then re-derive every table entry by repeatedly applying [`Self::f`]
    /// to a running 64-bit accumulator seeded at zero.
    fn mix_key(&mut self, key: &[u8]) {
        let mut key_pos = 0usize;
        for slot in &mut self.pbox {
            let mut word = 0u32;
            for _ in 0..4 {
                word = (word << 8) | u32::from(key[key_pos]);
                key_pos += 1;
                if key_pos == key.len() {
                    key_pos = 0;
                }
            }
            *slot ^= word;
        }

        // Each pair is written back before the next `f` call, so that call
        // reads the entries the previous step just overwrote, not the
        // pre-keying seed. `self.f(acc)` returns an owned u64 before the
        // write happens, so there is no borrow conflict between reading
        // `self.pbox`/`self.sboxN` inside `f` and writing them right after.
        let mut acc = 0u64;
        acc = self.rekey::<PBOX_ENTRIES>(acc, |cipher| &mut cipher.pbox);
        acc = self.rekey::<SBOX_ENTRIES>(acc, |cipher| &mut cipher.sbox1);
        acc = self.rekey::<SBOX_ENTRIES>(acc, |cipher| &mut cipher.sbox2);
        acc = self.rekey::<SBOX_ENTRIES>(acc, |cipher| &mut cipher.sbox3);
        self.rekey::<SBOX_ENTRIES>(acc, |cipher| &mut cipher.sbox4);
    }

    /// Derive `N` table entries in place by repeatedly applying [`Self::f`]
    /// to `acc`, writing each high/low pair directly into the table
    /// `select` points at before deriving the next pair. Returns the
    /// accumulator state after deriving the whole table, so the next table
    /// continues the same running sequence.
    fn rekey<const N: usize>(
        &mut self,
        mut acc: u64,
        select: impl Fn(&mut Self) -> &mut [u32; N],
    ) -> u64 {
        for i in (0..N).step_by(2) {
            acc = self.f(acc);
            let table = select(self);
            table[i] = (acc >> 32) as u32;
            table[i + 1] = acc as u32;
        }
        acc
    }

    /// The Blowfish round function, walked in the "decrypt" direction:
    /// `pbox` indices descend from 17 to 2, Feistel-style, alternating
    /// which half is mixed, followed by a swapped final whitening with
    /// `pbox[1]`/`pbox[0]`. Reused unchanged by both the key schedule and
    /// the CBC step. This is the one place the "decrypt direction" is
    /// encoded, and it is intentionally the same regardless of whether the
    /// caller is conceptually encoding or decoding.
    fn f(&self, block: u64) -> u64 {
        let mut hi = (block >> 32) as u32;
        let mut lo = block as u32;

        hi ^= self.pbox[17];
        lo ^= self.mix(hi) ^ self.pbox[16];
        hi ^= self.mix(lo) ^ self.pbox[15];
        lo ^= self.mix(hi) ^ self.pbox[14];
        hi ^= self.mix(lo) ^ self.pbox[13];
        lo ^= self.mix(hi) ^ self.pbox[12];
        hi ^= self.mix(lo) ^ self.pbox[11];
        lo ^= self.mix(hi) ^ self.pbox[10];
        hi ^= self.mix(lo) ^ self.pbox[9];
        lo ^= self.mix(hi) ^ self.pbox[8];
        hi ^= self.mix(lo) ^ self.pbox[7];
        lo ^= self.mix(hi) ^ self.pbox[6];
        hi ^= self.mix(lo) ^ self.pbox[5];
        lo ^= self.mix(hi) ^ self.pbox[4];
        hi ^= self.mix(lo) ^ self.pbox[3];
        lo ^= self.mix(hi) ^ self.pbox[2];
        hi ^= self.mix(lo);

        // Swapped final whitening: note hi/lo trade places.
        let (lo_final, hi_final) = (hi ^ self.pbox[1], lo ^ self.pbox[0]);
        (u64::from(lo_final) << 32) | u64::from(hi_final)
    }

    /// The Feistel mixing function: `F1(a>>24) + F2((a>>16)&0xff) XOR
    /// F3((a>>8)&0xff) + F4(a&0xff)`, all additions modulo 2^32.
    fn mix(&self, half: u32) -> u32 {
        let a = self.sbox1[(half >> 24) as usize];
        let b = self.sbox2[((half >> 16) & 0xff) as usize];
        let c = self.sbox3[((half >> 8) & 0xff) as usize];
        let d = self.sbox4[(half & 0xff) as usize];
        (a.wrapping_add(b) ^ c).wrapping_add(d)
    }

    /// One CBC step: advance `iv` by one round-function application, then
    /// XOR it into `block`. Identical for encode and decode.
    fn step(&mut self, block: u64) -> u64 {
        self.iv = self.f(self.iv);
        block ^ self.iv
    }

    /// Encode (equivalently, decode) `buf` in place, advancing `iv` by one
    /// block per 8 bytes processed, including a padded tail block.
    ///
    /// Full 8-byte blocks are XORed with successive keystream blocks.  A
    /// trailing `r` bytes (`0 < r < 8`) are shifted into the
    /// most-significant positions of a 64-bit word, the low `8 - r` bytes
    /// are padded with ASCII space, the padded word goes through one more
    /// CBC step, and only the first `r` result bytes are written back. The
    /// padded tail is discarded, so ciphertext length always equals
    /// plaintext length.
    pub fn encode(&mut self, buf: &mut [u8]) {
        let len = buf.len();
        let mut i = 0;
        while i + 8 <= len {
            let block = u64::from_be_bytes(buf[i..i + 8].try_into().unwrap_or([0; 8]));
            let out = self.step(block);
            buf[i..i + 8].copy_from_slice(&out.to_be_bytes());
            i += 8;
        }

        let remaining = len - i;
        if remaining > 0 {
            let mut last = 0u64;
            for &byte in &buf[i..len] {
                last = (last << 8) | u64::from(byte);
            }
            for _ in 0..(8 - remaining) {
                last = (last << 8) | u64::from(TAIL_PAD_BYTE);
            }

            let out = self.step(last);
            for (j, slot) in buf[i..len].iter_mut().enumerate() {
                *slot = (out >> (56 - j * 8)) as u8;
            }
        }
    }

    /// Identical to [`Self::encode`] - the MUS CBC step is its own
    /// inverse given matching cipher state.
    pub fn decode(&mut self, buf: &mut [u8]) {
        self.encode(buf);
    }

    /// [`Self::decode`], then reset `iv` to zero (tables untouched).
    pub fn decode_and_reset(&mut self, buf: &mut [u8]) {
        self.decode(buf);
        self.reset();
    }

    /// Reset `iv` to zero without re-running the key schedule.
    pub fn reset(&mut self) {
        self.iv = 0;
    }

    /// Override `iv` directly (test and replay use only).
    pub fn set_iv(&mut self, iv: u64) {
        self.iv = iv;
    }

    /// Current `iv`, exposed for diagnostics and tests.
    #[must_use]
    pub fn iv(&self) -> u64 {
        self.iv
    }
}

/// A process-lifetime, read-only table set derived once from the
/// configured key. [`MusBlowfish::new_precomputed`] copies from this rather
/// than re-running the key schedule per connection.
///
/// # Security
///
/// Immutable after construction; safe to share across connections/threads
/// without synchronization.
#[derive(Clone)]
pub struct PrecomputedTables {
    pbox: [u32; PBOX_ENTRIES],
    sbox1: [u32; SBOX_ENTRIES],
    sbox2: [u32; SBOX_ENTRIES],
    sbox3: [u32; SBOX_ENTRIES],
    sbox4: [u32; SBOX_ENTRIES],
}

impl PrecomputedTables {
    /// Derive the process-wide table set from `key` by running the key
    /// schedule once. Call this at startup and reuse the result for every
    /// connection.
    #[must_use]
    pub fn derive(key: &[u8]) -> Self {
        let keyed = MusBlowfish::new_keyed(key);
        Self {
            pbox: keyed.pbox,
            sbox1: keyed.sbox1,
            sbox2: keyed.sbox2,
            sbox3: keyed.sbox3,
            sbox4: keyed.sbox4,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn involution_round_trip() {
        let mut a = MusBlowfish::new_keyed(b"1289372893742894792893472938742");
        let mut b = MusBlowfish::new_keyed(b"1289372893742894792893472938742");

        let original = b"userIDpasswordmovieIDfaria".to_vec();
        let mut buf = original.clone();
        a.encode(&mut buf);
        b.decode(&mut buf);

        assert_eq!(buf, original);
    }

    #[test]
    fn stateful_iv_changes_second_ciphertext() {
        let mut cipher = MusBlowfish::new_keyed(b"some-key-some-key-some-key");
        let plaintext = [0x42u8; 16];

        let mut first = plaintext;
        cipher.encode(&mut first);

        let mut second = plaintext;
        cipher.encode(&mut second);

        assert_ne!(first, second);

        // Decoding in the same order recovers both plaintexts.
        let mut fresh = MusBlowfish::new_keyed(b"some-key-some-key-some-key");
        let mut recovered_first = first;
        fresh.decode(&mut recovered_first);
        let mut recovered_second = second;
        fresh.decode(&mut recovered_second);

        assert_eq!(recovered_first, plaintext);
        assert_eq!(recovered_second, plaintext);
    }

    #[test]
    fn tail_padding_preserves_length() {
        let mut cipher = MusBlowfish::new_keyed(b"tail-pad-key-tail-pad-key");
        let mut buf = vec![0x01, 0x02, 0x03];
        cipher.encode(&mut buf);
        assert_eq!(buf.len(), 3);

        let mut decoder = MusBlowfish::new_keyed(b"tail-pad-key-tail-pad-key");
        decoder.decode(&mut buf);
        assert_eq!(buf, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn precomputed_matches_keyed() {
        let tables = PrecomputedTables::derive(b"shared-secret-shared-secret");
        let mut from_precomputed = MusBlowfish::new_precomputed(&tables);
        let mut from_keyed = MusBlowfish::new_keyed(b"shared-secret-shared-secret");

        let mut a = *b"eightbyt";
        let mut b = *b"eightbyt";
        from_precomputed.encode(&mut a);
        from_keyed.encode(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn reset_zeroes_iv_but_keeps_tables() {
        let mut cipher = MusBlowfish::new_keyed(b"reset-key-reset-key-reset-key");
        let mut buf = [0u8; 8];
        cipher.encode(&mut buf);
        assert_ne!(cipher.iv(), 0);

        cipher.reset();
        assert_eq!(cipher.iv(), 0);

        let mut fresh = MusBlowfish::new_keyed(b"reset-key-reset-key-reset-key");
        let mut a = [0xAAu8; 8];
        let mut b = [0xAAu8; 8];
        cipher.encode(&mut a);
        fresh.encode(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn decode_and_reset_clears_iv() {
        let mut cipher = MusBlowfish::new_keyed(b"decode-reset-key-decode-reset");
        let mut buf = [0xFFu8; 16];
        cipher.decode_and_reset(&mut buf);
        assert_eq!(cipher.iv(), 0);
    }

    proptest! {
        #[test]
        fn cipher_involution(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut encoder = MusBlowfish::new_keyed(b"proptest-key-proptest-key-proptest");
            let mut decoder = MusBlowfish::new_keyed(b"proptest-key-proptest-key-proptest");

            let mut ciphertext = bytes.clone();
            encoder.encode(&mut ciphertext);
            let mut plaintext = ciphertext.clone();
            decoder.decode(&mut plaintext);

            prop_assert_eq!(plaintext, bytes);
        }

        #[test]
        fn encode_never_changes_length(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            let mut cipher = MusBlowfish::new_keyed(b"length-key-length-key-length-key");
            let original_len = bytes.len();
            let mut buf = bytes;
            cipher.encode(&mut buf);
            prop_assert_eq!(buf.len(), original_len);
        }
    }
}
