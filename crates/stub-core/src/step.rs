//! Software single-step: next-instruction computation and trap planting.

use log::trace;

use crate::registers::{FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};
use crate::target::TargetContext;

/// Trap instruction planted for single-stepping: `RST 08h`.
pub const TRAP_OPCODE: u8 = 0xCF;

/// Encoded length of the trap instruction; PC backup after a trap entry.
pub const TRAP_LEN: u16 = 1;

/// How the address of the following instruction derives from an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepRule {
    /// Straight-line instruction of the given encoded length.
    Fixed(u16),
    /// `0xDD`/`0xFD` index prefix; length depends on the sub-opcode.
    IndexPrefix,
    /// `0xED` prefix; mostly 2 bytes, with 4-byte direct-address forms.
    EdPrefix,
    /// `DJNZ d`: branches while the decremented `B` is non-zero.
    Djnz,
    /// `JR d`.
    JumpRel,
    /// `JR cc,d` with a 2-bit condition field.
    JumpRelCond,
    /// `JP nn`.
    JumpAbs,
    /// `JP cc,nn` with a 3-bit condition field.
    JumpAbsCond,
    /// `CALL nn`.
    Call,
    /// `CALL cc,nn`.
    CallCond,
    /// `RET`.
    Ret,
    /// `RET cc`.
    RetCond,
    /// `JP (HL)`.
    JumpHl,
    /// `RST t`: target encoded in the opcode.
    Rst,
}

/// One masked-pattern row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeRule {
    /// Value the masked opcode must equal.
    pub pattern: u8,
    /// Opcode bits participating in the match.
    pub mask: u8,
    /// Step rule applied on a match.
    pub step: StepRule,
}

const fn rule(pattern: u8, mask: u8, step: StepRule) -> OpcodeRule {
    OpcodeRule {
        pattern,
        mask,
        step,
    }
}

/// Ordered opcode classification table. First match wins; control-flow and
/// prefix rows precede the broad immediate-form rows, and the final row is
/// a catch-all for every remaining single-byte instruction.
pub const OPCODE_LENGTH_TABLE: &[OpcodeRule] = &[
    rule(0xCB, 0xFF, StepRule::Fixed(2)),
    rule(0xED, 0xFF, StepRule::EdPrefix),
    rule(0xDD, 0xFF, StepRule::IndexPrefix),
    rule(0xFD, 0xFF, StepRule::IndexPrefix),
    rule(0x10, 0xFF, StepRule::Djnz),
    rule(0x18, 0xFF, StepRule::JumpRel),
    rule(0x20, 0xE7, StepRule::JumpRelCond),
    rule(0xE9, 0xFF, StepRule::JumpHl),
    rule(0xC3, 0xFF, StepRule::JumpAbs),
    rule(0xCD, 0xFF, StepRule::Call),
    rule(0xC9, 0xFF, StepRule::Ret),
    rule(0xC2, 0xC7, StepRule::JumpAbsCond),
    rule(0xC4, 0xC7, StepRule::CallCond),
    rule(0xC0, 0xC7, StepRule::RetCond),
    rule(0xC7, 0xC7, StepRule::Rst),
    rule(0x01, 0xCF, StepRule::Fixed(3)),
    rule(0x06, 0xC7, StepRule::Fixed(2)),
    rule(0x22, 0xFF, StepRule::Fixed(3)),
    rule(0x2A, 0xFF, StepRule::Fixed(3)),
    rule(0x32, 0xFF, StepRule::Fixed(3)),
    rule(0x3A, 0xFF, StepRule::Fixed(3)),
    rule(0xC6, 0xC7, StepRule::Fixed(2)),
    rule(0xD3, 0xFF, StepRule::Fixed(2)),
    rule(0xDB, 0xFF, StepRule::Fixed(2)),
    rule(0x00, 0x00, StepRule::Fixed(1)),
];

fn rule_for(opcode: u8) -> StepRule {
    for row in OPCODE_LENGTH_TABLE {
        if opcode & row.mask == row.pattern {
            return row.step;
        }
    }
    // Unreachable: the table ends with a catch-all row.
    StepRule::Fixed(1)
}

/// Encoded length a rule implies when its opcode follows an index prefix.
const fn encoded_length(step: StepRule) -> u16 {
    match step {
        StepRule::Fixed(len) => len,
        StepRule::Djnz | StepRule::JumpRel | StepRule::JumpRelCond | StepRule::EdPrefix => 2,
        StepRule::JumpAbs | StepRule::JumpAbsCond | StepRule::Call | StepRule::CallCond => 3,
        StepRule::IndexPrefix
        | StepRule::Ret
        | StepRule::RetCond
        | StepRule::JumpHl
        | StepRule::Rst => 1,
    }
}

/// Whether an index-prefixed sub-opcode addresses `(HL)` and therefore
/// carries a displacement byte.
const fn displaced_operand(sub: u8) -> bool {
    match sub {
        0x34 | 0x35 | 0x36 | 0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => true,
        0x40..=0x7F => sub != 0x76 && (sub & 0x07 == 0x06 || (sub >> 3) & 0x07 == 0x06),
        _ => false,
    }
}

const fn condition2(cc: u8, f: u8) -> bool {
    match cc & 0x03 {
        0 => f & FLAG_Z == 0,
        1 => f & FLAG_Z != 0,
        2 => f & FLAG_C == 0,
        _ => f & FLAG_C != 0,
    }
}

const fn condition3(cc: u8, f: u8) -> bool {
    match cc & 0x07 {
        0 => f & FLAG_Z == 0,
        1 => f & FLAG_Z != 0,
        2 => f & FLAG_C == 0,
        3 => f & FLAG_C != 0,
        4 => f & FLAG_PV == 0,
        5 => f & FLAG_PV != 0,
        6 => f & FLAG_S == 0,
        _ => f & FLAG_S != 0,
    }
}

fn relative_target<T: TargetContext>(target: &mut T, pc: u16) -> u16 {
    let disp = target.read_byte(pc.wrapping_add(1)) as i8;
    pc.wrapping_add(2).wrapping_add_signed(i16::from(disp))
}

fn return_target<T: TargetContext>(target: &mut T) -> u16 {
    let sp = target.registers().sp;
    target.read_word_le(sp)
}

/// Computes the address of the instruction that will execute after the one
/// at `pc`, evaluating branch conditions against the saved flags.
pub fn next_instruction_addr<T: TargetContext>(target: &mut T, pc: u16) -> u16 {
    let opcode = target.read_byte(pc);
    let f = target.registers().f;
    match rule_for(opcode) {
        StepRule::Fixed(len) => pc.wrapping_add(len),
        StepRule::IndexPrefix => {
            let sub = target.read_byte(pc.wrapping_add(1));
            if sub == 0xCB {
                // DD CB d op
                pc.wrapping_add(4)
            } else {
                let len = 1 + encoded_length(rule_for(sub)) + u16::from(displaced_operand(sub));
                pc.wrapping_add(len)
            }
        }
        StepRule::EdPrefix => {
            let sub = target.read_byte(pc.wrapping_add(1));
            if sub & 0xC7 == 0x43 {
                // ld (nn),rr / ld rr,(nn)
                pc.wrapping_add(4)
            } else if sub & 0xC7 == 0x45 {
                // retn / reti
                return_target(target)
            } else {
                pc.wrapping_add(2)
            }
        }
        StepRule::Djnz => {
            if target.registers().b().wrapping_sub(1) == 0 {
                pc.wrapping_add(2)
            } else {
                relative_target(target, pc)
            }
        }
        StepRule::JumpRel => relative_target(target, pc),
        StepRule::JumpRelCond => {
            if condition2(opcode >> 3, f) {
                relative_target(target, pc)
            } else {
                pc.wrapping_add(2)
            }
        }
        StepRule::JumpAbs | StepRule::Call => target.read_word_le(pc.wrapping_add(1)),
        StepRule::JumpAbsCond | StepRule::CallCond => {
            if condition3(opcode >> 3, f) {
                target.read_word_le(pc.wrapping_add(1))
            } else {
                pc.wrapping_add(3)
            }
        }
        StepRule::Ret => return_target(target),
        StepRule::RetCond => {
            if condition3(opcode >> 3, f) {
                return_target(target)
            } else {
                pc.wrapping_add(1)
            }
        }
        StepRule::JumpHl => target.registers().hl,
        StepRule::Rst => u16::from(opcode & 0x38),
    }
}

/// A trap byte currently planted in target memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlantedTrap {
    /// Address holding the trap byte.
    pub addr: u16,
    /// Instruction byte the trap replaced.
    pub original: u8,
}

/// Owns the single outstanding trap plant used to implement `s`.
#[derive(Debug, Default)]
pub struct StepEngine {
    pending: Option<PlantedTrap>,
}

impl StepEngine {
    /// Creates an engine with no outstanding plant.
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Plants the trap over the next instruction and records the overwritten
    /// byte. Returns the planted address.
    pub fn plant<T: TargetContext>(&mut self, target: &mut T) -> u16 {
        let pc = target.pc();
        let addr = next_instruction_addr(target, pc);
        let original = target.read_byte(addr);
        target.write_byte(addr, TRAP_OPCODE);
        self.pending = Some(PlantedTrap { addr, original });
        trace!(target: "stub", "trap planted at {addr:#06x} over {original:#04x}");
        addr
    }

    /// Restores the overwritten byte. Idempotent; a no-op when nothing is
    /// planted.
    pub fn undo<T: TargetContext>(&mut self, target: &mut T) {
        if let Some(trap) = self.pending.take() {
            target.write_byte(trap.addr, trap.original);
            trace!(target: "stub", "trap removed from {:#06x}", trap.addr);
        }
    }

    /// Currently planted trap, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<PlantedTrap> {
        self.pending
    }
}
