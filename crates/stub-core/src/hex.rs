//! Hex digit codec and cursor-style hex parsing for the wire protocol.

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Decodes one ASCII hex digit, accepting both cases.
///
/// Returns `None` for any non-hex byte so that malformed input is rejected
/// instead of silently decoding to zero.
#[must_use]
pub const fn hex_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Lowercase hex character for the high nibble of `value`.
#[must_use]
pub const fn high_nibble(value: u8) -> u8 {
    HEX_CHARS[(value >> 4) as usize]
}

/// Lowercase hex character for the low nibble of `value`.
#[must_use]
pub const fn low_nibble(value: u8) -> u8 {
    HEX_CHARS[(value & 0x0F) as usize]
}

/// Decodes `dst.len()` bytes from the leading `2 * dst.len()` hex digits of
/// `src`.
///
/// Fails when `src` is too short or contains a non-hex digit in that window.
/// `dst` is scratch space and holds no guaranteed content on failure; callers
/// treat the whole decode as not having happened.
#[must_use]
pub fn decode_bytes(src: &[u8], dst: &mut [u8]) -> Option<()> {
    if src.len() < dst.len() * 2 {
        return None;
    }
    for (slot, pair) in dst.iter_mut().zip(src.chunks_exact(2)) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        *slot = (hi << 4) | lo;
    }
    Some(())
}

/// Forward-only parser over the argument bytes of a command payload.
#[derive(Debug)]
pub struct HexCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HexCursor<'a> {
    /// Creates a cursor at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Greedily parses a hex integer at the cursor.
    ///
    /// Consumes every leading hex digit and returns the accumulated value,
    /// or `None` when zero digits were consumed. The accumulator wraps on
    /// overlong input; command arguments never legitimately exceed 32 bits.
    pub fn parse_int(&mut self) -> Option<u32> {
        let mut value: u32 = 0;
        let mut digits = 0usize;
        while let Some(nibble) = self.data.get(self.pos).copied().and_then(hex_digit) {
            value = (value << 4) | u32::from(nibble);
            self.pos += 1;
            digits += 1;
        }
        if digits == 0 {
            return None;
        }
        Some(value)
    }

    /// Consumes `byte` at the cursor, returning whether it was present.
    pub fn expect(&mut self, byte: u8) -> bool {
        if self.data.get(self.pos) == Some(&byte) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Remaining unconsumed bytes.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
