//! Target-resident remote debug stub core for Z80-class targets.
//!
//! The crate implements the firmware half of a remote debug session: packet
//! framing with checksum, acknowledgement and run-length encoding; a command
//! dispatcher for register, memory and execution-control commands; and
//! software single-stepping by planting a one-byte trap over the next
//! instruction. The embedding firmware supplies the two collaborator traits
//! ([`ByteTransport`] for the serial link, [`TargetContext`] for memory and
//! the saved register snapshot) and calls [`Agent::handle_exception`] from
//! its trap handlers.

/// Hex digit codec and cursor-style hex parsing.
pub mod hex;
pub use hex::{decode_bytes, hex_digit, high_nibble, low_nibble, HexCursor};

/// Packet framing, checksum, ack/retry and run-length encoding.
pub mod packet;
pub use packet::{receive_packet, send_packet, FrameError, PacketBuf, BUFMAX, MAX_PAYLOAD};

/// Byte-link collaborator trait.
pub mod transport;
pub use transport::ByteTransport;

/// Z80 register file with the host-visible wire layout.
pub mod registers;
pub use registers::{RegisterFile, FLAG_C, FLAG_PV, FLAG_S, FLAG_Z, NUMREGBYTES};

/// Target memory and register collaborator trait.
pub mod target;
pub use target::TargetContext;

/// Exception vectors and protocol stop signals.
pub mod signal;
pub use signal::{
    Signal, VEC_BREAKPOINT, VEC_CPU_BUS_ERROR, VEC_DMA_BUS_ERROR, VEC_INVALID_INSN,
    VEC_INVALID_SLOT, VEC_NMI, VEC_TRAP, VEC_USER,
};

/// Next-instruction computation and trap planting for single-step.
pub mod step;
pub use step::{
    next_instruction_addr, OpcodeRule, PlantedTrap, StepEngine, StepRule, OPCODE_LENGTH_TABLE,
    TRAP_LEN, TRAP_OPCODE,
};

/// Exception routing and host command dispatch.
pub mod agent;
pub use agent::{Agent, CommandError, Resume};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
