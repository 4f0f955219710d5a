//! Z80 register file with the wire layout the debug host expects.

/// Serialized size of the register file in the `g`/`G` blob.
pub const NUMREGBYTES: usize = 26;

/// Carry flag bit in `F`.
pub const FLAG_C: u8 = 1 << 0;
/// Parity/overflow flag bit in `F`.
pub const FLAG_PV: u8 = 1 << 2;
/// Zero flag bit in `F`.
pub const FLAG_Z: u8 = 1 << 6;
/// Sign flag bit in `F`.
pub const FLAG_S: u8 = 1 << 7;

/// Snapshot of the target's architectural registers.
///
/// Field order is wire-visible: `to_wire` serializes the fields in
/// declaration order with 16-bit values little-endian, 26 bytes total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    /// Accumulator.
    pub a: u8,
    /// Flags.
    pub f: u8,
    /// BC pair.
    pub bc: u16,
    /// DE pair.
    pub de: u16,
    /// HL pair.
    pub hl: u16,
    /// Index register IX.
    pub ix: u16,
    /// Index register IY.
    pub iy: u16,
    /// Stack pointer.
    pub sp: u16,
    /// Interrupt page register.
    pub i: u8,
    /// Memory refresh register.
    pub r: u8,
    /// Shadow accumulator.
    pub ax: u8,
    /// Shadow flags.
    pub fx: u8,
    /// Shadow BC pair.
    pub bcx: u16,
    /// Shadow DE pair.
    pub dex: u16,
    /// Shadow HL pair.
    pub hlx: u16,
    /// Program counter.
    pub pc: u16,
}

impl RegisterFile {
    /// Serializes the register file into its wire blob.
    #[must_use]
    pub fn to_wire(&self) -> [u8; NUMREGBYTES] {
        let mut wire = [0u8; NUMREGBYTES];
        wire[0] = self.a;
        wire[1] = self.f;
        wire[2..4].copy_from_slice(&self.bc.to_le_bytes());
        wire[4..6].copy_from_slice(&self.de.to_le_bytes());
        wire[6..8].copy_from_slice(&self.hl.to_le_bytes());
        wire[8..10].copy_from_slice(&self.ix.to_le_bytes());
        wire[10..12].copy_from_slice(&self.iy.to_le_bytes());
        wire[12..14].copy_from_slice(&self.sp.to_le_bytes());
        wire[14] = self.i;
        wire[15] = self.r;
        wire[16] = self.ax;
        wire[17] = self.fx;
        wire[18..20].copy_from_slice(&self.bcx.to_le_bytes());
        wire[20..22].copy_from_slice(&self.dex.to_le_bytes());
        wire[22..24].copy_from_slice(&self.hlx.to_le_bytes());
        wire[24..26].copy_from_slice(&self.pc.to_le_bytes());
        wire
    }

    /// Reconstructs a register file from its wire blob.
    #[must_use]
    pub fn from_wire(wire: &[u8; NUMREGBYTES]) -> Self {
        Self {
            a: wire[0],
            f: wire[1],
            bc: u16::from_le_bytes([wire[2], wire[3]]),
            de: u16::from_le_bytes([wire[4], wire[5]]),
            hl: u16::from_le_bytes([wire[6], wire[7]]),
            ix: u16::from_le_bytes([wire[8], wire[9]]),
            iy: u16::from_le_bytes([wire[10], wire[11]]),
            sp: u16::from_le_bytes([wire[12], wire[13]]),
            i: wire[14],
            r: wire[15],
            ax: wire[16],
            fx: wire[17],
            bcx: u16::from_le_bytes([wire[18], wire[19]]),
            dex: u16::from_le_bytes([wire[20], wire[21]]),
            hlx: u16::from_le_bytes([wire[22], wire[23]]),
            pc: u16::from_le_bytes([wire[24], wire[25]]),
        }
    }

    /// High byte of `BC`, the loop counter for decrement-and-branch.
    #[must_use]
    pub const fn b(&self) -> u8 {
        (self.bc >> 8) as u8
    }

    /// Replaces the high byte of `BC`.
    pub fn set_b(&mut self, value: u8) {
        self.bc = (self.bc & 0x00FF) | (u16::from(value) << 8);
    }

    /// Whether the given `F` flag bit is set.
    #[must_use]
    pub const fn flag(&self, bit: u8) -> bool {
        self.f & bit != 0
    }
}
