//! Hardware exception vectors and their protocol stop signals.

/// Invalid instruction vector.
pub const VEC_INVALID_INSN: u8 = 4;
/// Invalid slot vector.
pub const VEC_INVALID_SLOT: u8 = 6;
/// Breakpoint vector, reached through the planted trap instruction.
pub const VEC_BREAKPOINT: u8 = 8;
/// CPU bus error vector.
pub const VEC_CPU_BUS_ERROR: u8 = 9;
/// DMA bus error vector.
pub const VEC_DMA_BUS_ERROR: u8 = 10;
/// Non-maskable interrupt vector.
pub const VEC_NMI: u8 = 11;
/// Explicit trap vector.
pub const VEC_TRAP: u8 = 32;
/// User-raised stop vector.
pub const VEC_USER: u8 = 255;

/// Stop signal numbers reported to the host in `S` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Signal {
    /// Interrupt.
    Int = 2,
    /// Illegal instruction.
    Ill = 4,
    /// Trace/breakpoint trap.
    Trap = 5,
    /// Software-generated stop.
    Emt = 7,
    /// Bus error.
    Bus = 10,
}

impl Signal {
    /// Stable wire value of the signal.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Maps a hardware exception vector to its stop signal.
    ///
    /// Unrecognized vectors report as software-generated, never as a
    /// protocol error.
    #[must_use]
    pub const fn from_vector(vector: u8) -> Self {
        match vector {
            VEC_INVALID_INSN | VEC_INVALID_SLOT => Self::Ill,
            VEC_CPU_BUS_ERROR | VEC_DMA_BUS_ERROR => Self::Bus,
            VEC_NMI => Self::Int,
            VEC_BREAKPOINT | VEC_TRAP | VEC_USER => Self::Trap,
            _ => Self::Emt,
        }
    }
}
