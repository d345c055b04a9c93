use core::fmt;

/// Modulus used by the Adler-32 accumulator, the largest prime below 2^16.
const MOD_ADLER: u32 = 65521;

/// Largest number of bytes that can be folded into `s1`/`s2` before either
/// accumulator risks overflowing a `u32` and needs a modulo reduction.
///
/// Matches zlib's `NMAX` constant (5552), which bounds how many additions
/// `s2` can absorb before `5552 * 255 * 256 < 2^32` stops holding.
const NMAX: usize = 5552;

/// Errors that can occur while folding data into an [`Adler32`] accumulator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumError {
    /// [`Adler32::finalize`] was called before any bytes were folded in.
    EmptyStream,
}

impl fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyStream => write!(f, "checksum requires at least one byte of input"),
        }
    }
}

impl std::error::Error for ChecksumError {}

/// Incremental Adler-32 accumulator, folded one buffer at a time.
///
/// The algorithm matches zlib's `adler32()`: `s1` accumulates the running
/// byte sum and `s2` accumulates the running sum of `s1`, both reduced
/// modulo 65521. Unlike a sliding-window rolling checksum, this accumulator
/// only ever grows forward over a sequence of reads; it has no notion of
/// removing bytes from the front of a window.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Adler32 {
    s1: u32,
    s2: u32,
    len: u64,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Adler32 {
    /// Creates a fresh accumulator with the algorithm's initial state (`s1 = 1`, `s2 = 0`).
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::adler::Adler32;
    ///
    /// let checksum = Adler32::new();
    /// assert!(checksum.is_empty());
    /// assert_eq!(checksum.value(), 1);
    /// ```
    #[must_use]
    pub const fn new() -> Self {
        Self { s1: 1, s2: 0, len: 0 }
    }

    /// Returns the number of bytes folded into the accumulator so far.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if no bytes have been folded in yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Folds one buffer's worth of bytes into the accumulator.
    ///
    /// Each call is independent of how the caller chunked the stream: folding
    /// `"ab"` then `"cdef"` yields the same state as folding `"abcdef"` in one
    /// call, and an empty buffer never changes the state. This mirrors the
    /// per-read folding used while streaming striped objects off the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::adler::Adler32;
    ///
    /// let mut whole = Adler32::new();
    /// whole.update(b"abcdef");
    ///
    /// let mut chunked = Adler32::new();
    /// chunked.update(b"ab");
    /// chunked.update(b"");
    /// chunked.update(b"cdef");
    ///
    /// assert_eq!(whole.value(), chunked.value());
    /// ```
    pub fn update(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let mut s1 = self.s1;
        let mut s2 = self.s2;

        for block in chunk.chunks(NMAX) {
            for &byte in block {
                s1 += u32::from(byte);
                s2 += s1;
            }
            s1 %= MOD_ADLER;
            s2 %= MOD_ADLER;
        }

        self.s1 = s1;
        self.s2 = s2;
        self.len = self.len.saturating_add(chunk.len() as u64);
    }

    /// Returns the packed 32-bit Adler-32 value, `(s2 << 16) | s1`.
    #[must_use]
    pub const fn value(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }

    /// Returns the checksum as the eight-character lowercase hex string used
    /// in metadata records and over the wire, encoding [`Self::value`] in
    /// big-endian byte order.
    ///
    /// # Examples
    ///
    /// ```
    /// use checksums::adler::Adler32;
    ///
    /// let mut checksum = Adler32::new();
    /// checksum.update(b"ab");
    /// checksum.update(b"cdef");
    /// assert_eq!(checksum.to_hex(), "0adb02bd");
    /// ```
    #[must_use]
    pub fn to_hex(&self) -> String {
        let bytes = self.value().to_be_bytes();
        let mut out = String::with_capacity(8);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Finalizes the accumulator, rejecting an empty stream.
    ///
    /// Callers that must distinguish "checksum of zero bytes" from "no data
    /// was ever read" (for example, detecting a truncated chunk read) should
    /// use this instead of [`Self::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::EmptyStream`] if [`Self::update`] was never
    /// called with a non-empty buffer.
    pub fn finalize(&self) -> Result<String, ChecksumError> {
        if self.is_empty() {
            return Err(ChecksumError::EmptyStream);
        }
        Ok(self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(data: &[u8]) -> u32 {
        let mut s1: u32 = 1;
        let mut s2: u32 = 0;
        for &byte in data {
            s1 = (s1 + u32::from(byte)) % MOD_ADLER;
            s2 = (s2 + s1) % MOD_ADLER;
        }
        (s2 << 16) | s1
    }

    #[test]
    fn empty_stream_has_initial_value_one() {
        let checksum = Adler32::new();
        assert_eq!(checksum.value(), 1);
        assert_eq!(checksum.to_hex(), "00000001");
    }

    #[test]
    fn matches_reference_for_known_string() {
        let mut checksum = Adler32::new();
        checksum.update(b"Wikipedia");
        assert_eq!(checksum.value(), reference(b"Wikipedia"));
        assert_eq!(checksum.value(), 0x11E6_0398);
    }

    #[test]
    fn chunk_boundaries_do_not_affect_the_result() {
        let whole = {
            let mut c = Adler32::new();
            c.update(b"abcdefg");
            c
        };

        let chunked = {
            let mut c = Adler32::new();
            for part in [&b"ab"[..], &b""[..], &b"cdef"[..], &b"g"[..]] {
                c.update(part);
            }
            c
        };

        assert_eq!(whole.value(), chunked.value());
        assert_eq!(whole.to_hex(), chunked.to_hex());
        assert_eq!(chunked.to_hex(), "0adb02bd");
    }

    #[test]
    fn len_tracks_total_bytes_folded() {
        let mut checksum = Adler32::new();
        checksum.update(b"ab");
        checksum.update(b"cdef");
        assert_eq!(checksum.len(), 6);
        assert!(!checksum.is_empty());
    }

    #[test]
    fn folding_a_buffer_larger_than_nmax_matches_reference() {
        let data = vec![0x5Au8; NMAX * 3 + 17];
        let mut checksum = Adler32::new();
        checksum.update(&data);
        assert_eq!(checksum.value(), reference(&data));
    }

    #[test]
    fn finalize_rejects_empty_stream() {
        let checksum = Adler32::new();
        assert_eq!(checksum.finalize(), Err(ChecksumError::EmptyStream));
    }

    #[test]
    fn finalize_succeeds_after_any_update() {
        let mut checksum = Adler32::new();
        checksum.update(b"");
        checksum.update(b"x");
        assert!(checksum.finalize().is_ok());
    }

    proptest::proptest! {
        #[test]
        fn chunking_never_changes_the_result(chunks in proptest::collection::vec(proptest::collection::vec(proptest::prelude::any::<u8>(), 0..=64), 0..=8)) {
            let mut incremental = Adler32::new();
            let mut concatenated = Vec::new();
            for chunk in &chunks {
                incremental.update(chunk);
                concatenated.extend_from_slice(chunk);
            }

            let mut single_pass = Adler32::new();
            single_pass.update(&concatenated);

            proptest::prop_assert_eq!(incremental.value(), single_pass.value());
            proptest::prop_assert_eq!(incremental.value(), reference(&concatenated));
        }
    }
}
