//! Byte-link collaborator trait over which packets travel.

/// Blocking byte transport to the debug host.
///
/// Implementations wrap whatever physical link the target exposes, typically
/// a UART. Both directions block: `recv_byte` waits until a byte arrives and
/// `send_byte` waits until the byte is accepted. The protocol layers above
/// rely on that blocking behavior for pacing; there are no timeouts.
pub trait ByteTransport {
    /// Transmits one byte to the host.
    fn send_byte(&mut self, byte: u8);

    /// Receives one byte from the host, blocking until one is available.
    fn recv_byte(&mut self) -> u8;
}
