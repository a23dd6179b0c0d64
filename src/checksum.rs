//! 16-bit internet-style checksum (§4.5), with a streamable context so that
//! superblocks (§4.6) can fold a header and a variable-length payload without
//! materializing both in one contiguous buffer.

/// A streaming context for the internet checksum algorithm.
///
/// `feed` may be called any number of times with byte slices of any length;
/// the result is identical to calling [`checksum`] once on the concatenation
/// of all fed slices. An odd-length feed latches its trailing byte and pairs
/// it with the leading byte of the next feed (§9 open question (b)).
#[derive(Clone, Copy, Debug, Default)]
pub struct Checksum {
    sum: u32,
    latched: Option<u8>,
    total_len: u64,
}

impl Checksum {
    /// Starts a new checksum context.
    pub fn reset() -> Self {
        Self {
            sum: 0,
            latched: None,
            total_len: 0,
        }
    }

    /// Folds `bytes` into the running sum.
    pub fn feed(&mut self, mut bytes: &[u8]) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }
        self.total_len += bytes.len() as u64;

        if let Some(lo) = self.latched.take() {
            let word = u16::from_le_bytes([lo, bytes[0]]);
            self.sum += word as u32;
            bytes = &bytes[1..];
        }

        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            let word = u16::from_le_bytes([pair[0], pair[1]]);
            self.sum += word as u32;
        }

        let remainder = chunks.remainder();
        if let [b] = remainder {
            self.latched = Some(*b);
        }

        self
    }

    /// Folds the accumulated 32-bit sum into the final 16-bit one's
    /// complement checksum, consuming any still-latched trailing byte as if
    /// it were paired with a zero byte.
    pub fn get(&self) -> u16 {
        if self.total_len == 0 {
            return 0;
        }
        let mut sum = self.sum;
        if let Some(lo) = self.latched {
            sum += lo as u32;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }

    /// The number of bytes fed so far that have not yet been folded into
    /// `sum` (0 or 1, reflecting a still-latched trailing byte).
    pub fn size(&self) -> usize {
        self.latched.is_some() as usize
    }
}

/// Computes the checksum of a single byte sequence in one call.
///
/// `checksum(&[])` is `0` (§8 Property 1): an empty input never folds
/// anything into the running sum, so [`Checksum::get`] short-circuits to `0`
/// rather than returning the one's complement of an all-zero sum.
pub fn checksum(bytes: &[u8]) -> u16 {
    Checksum::reset().feed(bytes).get()
}
