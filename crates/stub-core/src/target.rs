//! Target-side collaborator trait giving the stub memory and register access.

use crate::registers::RegisterFile;

/// Debuggee state as seen by the stub.
///
/// The stub performs no address validation of its own; exposing all of
/// memory to the host is the point of the protocol, so legality of any
/// given access is the implementor's contract.
pub trait TargetContext {
    /// Reads one byte of target memory.
    fn read_byte(&mut self, addr: u16) -> u8;

    /// Writes one byte of target memory.
    fn write_byte(&mut self, addr: u16, value: u8);

    /// Saved register snapshot for the stopped context.
    fn registers(&self) -> &RegisterFile;

    /// Mutable access to the saved register snapshot.
    fn registers_mut(&mut self) -> &mut RegisterFile;

    /// Reads a little-endian 16-bit word, wrapping at the address-space end.
    fn read_word_le(&mut self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Program counter of the stopped context.
    fn pc(&self) -> u16 {
        self.registers().pc
    }

    /// Moves the program counter of the stopped context.
    fn set_pc(&mut self, addr: u16) {
        self.registers_mut().pc = addr;
    }
}
