//! Packet framing: `$payload#ck` assembly, checksum, ack/retry and RLE.

use thiserror::Error;

use crate::hex;
use crate::transport::ByteTransport;

/// Size of each fixed packet buffer.
pub const BUFMAX: usize = 256;

/// Largest payload a packet may carry.
pub const MAX_PAYLOAD: usize = BUFMAX - 1;

/// Longest run the encoder collapses; `RLE_MAX_RUN + 29` is the last
/// printable count byte.
const RLE_MAX_RUN: usize = 97;

/// Bias added to a run length to form the printable count byte.
const RLE_BIAS: usize = 29;

/// Runs of this length or shorter are emitted literally.
const RLE_LITERAL_MAX: usize = 3;

/// Errors raised by the bounded packet buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FrameError {
    /// A payload byte would not fit in the fixed buffer.
    #[error("packet payload exceeds {MAX_PAYLOAD} bytes")]
    Overflow,
}

/// Fixed-capacity payload buffer reused across packet exchanges.
#[derive(Debug, Clone)]
pub struct PacketBuf {
    bytes: [u8; BUFMAX],
    len: usize,
}

impl PacketBuf {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0; BUFMAX],
            len: 0,
        }
    }

    /// Discards the current payload.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends one byte, failing at capacity.
    pub fn push(&mut self, byte: u8) -> Result<(), FrameError> {
        if self.len >= MAX_PAYLOAD {
            return Err(FrameError::Overflow);
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Appends a slice, failing without partial effect if it would overflow.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if self.len + bytes.len() > MAX_PAYLOAD {
            return Err(FrameError::Overflow);
        }
        self.bytes[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Appends one byte as two lowercase hex digits, high nibble first.
    pub fn push_hex_byte(&mut self, value: u8) -> Result<(), FrameError> {
        self.push(hex::high_nibble(value))?;
        self.push(hex::low_nibble(value))
    }

    /// Current payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Current payload length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no payload.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for PacketBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives one well-formed packet into `buf`, handling acknowledgement.
///
/// Blocks until a packet with a valid checksum arrives. Junk before `$` is
/// discarded; a `$` in mid-payload restarts frame assembly; a checksum
/// mismatch or non-hex checksum digits answer `-` and resynchronize so the
/// host retransmits. A payload that would overflow the buffer is rejected
/// the same way. On success `+` is acknowledged and, when the payload opens
/// with a two-character sequence id (`XX:`), those two characters are echoed
/// back raw and the returned offset skips past the `:`.
///
/// Returns the offset of the command text within `buf`.
pub fn receive_packet<L: ByteTransport>(link: &mut L, buf: &mut PacketBuf) -> usize {
    loop {
        // Discard everything up to the start-of-packet marker.
        while link.recv_byte() != b'$' {}
        'frame: loop {
            buf.clear();
            let mut checksum: u8 = 0;
            loop {
                match link.recv_byte() {
                    b'$' => continue 'frame,
                    b'#' => break,
                    byte => {
                        if buf.push(byte).is_err() {
                            link.send_byte(b'-');
                            break 'frame;
                        }
                        checksum = checksum.wrapping_add(byte);
                    }
                }
            }
            let hi = hex::hex_digit(link.recv_byte());
            let lo = hex::hex_digit(link.recv_byte());
            let sent = match (hi, lo) {
                (Some(hi), Some(lo)) => Some((hi << 4) | lo),
                _ => None,
            };
            if sent == Some(checksum) {
                link.send_byte(b'+');
                let payload = buf.as_bytes();
                if payload.len() >= 3 && payload[2] == b':' {
                    link.send_byte(payload[0]);
                    link.send_byte(payload[1]);
                    return 3;
                }
                return 0;
            }
            link.send_byte(b'-');
            break 'frame;
        }
    }
}

/// Transmits `payload` as a framed packet and waits for acknowledgement.
///
/// Runs of four or more identical bytes are collapsed to
/// `byte '*' (run + 29)`; the run is capped so the count byte stays
/// printable. The checksum covers the bytes as transmitted, RLE markers
/// included. The packet is retransmitted until the host answers `+`; an
/// unresponsive host stalls the stub, which is the protocol's contract.
pub fn send_packet<L: ByteTransport>(link: &mut L, payload: &[u8]) {
    loop {
        link.send_byte(b'$');
        let mut checksum: u8 = 0;
        let mut index = 0;
        while index < payload.len() {
            let byte = payload[index];
            let mut run = 1;
            while run < RLE_MAX_RUN
                && index + run < payload.len()
                && payload[index + run] == byte
            {
                run += 1;
            }
            if run > RLE_LITERAL_MAX {
                let count = (run + RLE_BIAS) as u8;
                for encoded in [byte, b'*', count] {
                    link.send_byte(encoded);
                    checksum = checksum.wrapping_add(encoded);
                }
                index += run;
            } else {
                link.send_byte(byte);
                checksum = checksum.wrapping_add(byte);
                index += 1;
            }
        }
        link.send_byte(b'#');
        link.send_byte(hex::high_nibble(checksum));
        link.send_byte(hex::low_nibble(checksum));
        if link.recv_byte() == b'+' {
            return;
        }
    }
}
