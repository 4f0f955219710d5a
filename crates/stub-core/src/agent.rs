//! Exception routing and host command dispatch.

use log::{debug, trace};
use thiserror::Error;

use crate::hex::{self, HexCursor};
use crate::packet::{self, PacketBuf, MAX_PAYLOAD};
use crate::registers::{RegisterFile, NUMREGBYTES};
use crate::signal::{Signal, VEC_BREAKPOINT};
use crate::step::{PlantedTrap, StepEngine, TRAP_LEN};
use crate::target::TargetContext;
use crate::transport::ByteTransport;

/// Largest byte count a single memory command may transfer.
const MAX_TRANSFER_BYTES: usize = MAX_PAYLOAD / 2;

/// How execution resumes once the command loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resume {
    /// Resume at PC and run freely.
    Continue,
    /// Resume at PC with a trap planted on the following instruction.
    Step,
}

/// Command parse failures and their wire error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CommandError {
    /// Memory-read arguments did not parse or the reply would not fit.
    #[error("malformed memory read request")]
    MalformedMemoryRead,
    /// Memory-write arguments or data hex did not parse.
    #[error("malformed memory write request")]
    MalformedMemoryWrite,
    /// Register blob was short or contained non-hex digits.
    #[error("malformed register write blob")]
    MalformedRegisterWrite,
}

impl CommandError {
    /// Reply text sent to the host for this error.
    #[must_use]
    pub const fn reply_code(self) -> &'static [u8] {
        match self {
            Self::MalformedMemoryRead => b"E01",
            Self::MalformedMemoryWrite => b"E02",
            Self::MalformedRegisterWrite => b"E03",
        }
    }
}

/// Session state of the stub: packet buffers, step engine, trace flag and
/// the signal of the most recent stop.
///
/// One `Agent` lives for the whole debug session; its buffers are reused
/// across exchanges and nothing here allocates after construction.
#[derive(Debug)]
pub struct Agent {
    inbound: PacketBuf,
    outbound: PacketBuf,
    step: StepEngine,
    trace_packets: bool,
    signal: Signal,
}

impl Agent {
    /// Creates an idle agent.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inbound: PacketBuf::new(),
            outbound: PacketBuf::new(),
            step: StepEngine::new(),
            trace_packets: false,
            signal: Signal::Trap,
        }
    }

    /// Signal reported for the most recent stop.
    #[must_use]
    pub const fn last_signal(&self) -> Signal {
        self.signal
    }

    /// Whether the host has toggled per-packet trace logging on.
    #[must_use]
    pub const fn trace_enabled(&self) -> bool {
        self.trace_packets
    }

    /// Trap currently planted for a pending single step, if any.
    #[must_use]
    pub const fn planted_trap(&self) -> Option<PlantedTrap> {
        self.step.pending()
    }

    /// Runs the stop-and-command exchange for one exception entry.
    ///
    /// Announces the stop with an `S` packet, backs PC up over the trap
    /// instruction when the entry came through the breakpoint vector,
    /// removes any outstanding trap plant, then serves host commands until
    /// one resumes execution. On `Resume::Step` a fresh trap has been
    /// planted on the instruction after PC before returning.
    pub fn handle_exception<T: TargetContext, L: ByteTransport>(
        &mut self,
        vector: u8,
        target: &mut T,
        link: &mut L,
    ) -> Resume {
        self.signal = Signal::from_vector(vector);
        debug!(
            target: "stub",
            "stopped: vector {vector}, signal {}", self.signal.as_u8()
        );

        write_stop_reply(&mut self.outbound, self.signal);
        packet::send_packet(link, self.outbound.as_bytes());

        if vector == VEC_BREAKPOINT {
            let pc = target.pc().wrapping_sub(TRAP_LEN);
            target.set_pc(pc);
        }
        self.step.undo(target);

        loop {
            let start = packet::receive_packet(link, &mut self.inbound);
            self.outbound.clear();
            let payload = &self.inbound.as_bytes()[start..];
            if self.trace_packets {
                debug!(target: "stub", "command: {}", String::from_utf8_lossy(payload));
            } else {
                trace!(target: "stub", "command: {}", String::from_utf8_lossy(payload));
            }
            let (&command, args) = payload.split_first().unwrap_or((&0, &[]));

            let resume = match command {
                b'?' => {
                    write_stop_reply(&mut self.outbound, self.signal);
                    None
                }
                b'd' => {
                    self.trace_packets = !self.trace_packets;
                    None
                }
                b'g' => {
                    read_registers_reply(&mut self.outbound, target);
                    None
                }
                b'G' => {
                    reply_status(&mut self.outbound, write_registers(target, args));
                    None
                }
                b'm' => {
                    if let Err(err) = read_memory_reply(&mut self.outbound, target, args) {
                        self.outbound.clear();
                        let _ = self.outbound.extend_from_slice(err.reply_code());
                    }
                    None
                }
                b'M' => {
                    reply_status(&mut self.outbound, write_memory(target, args));
                    None
                }
                b's' => {
                    move_pc_if_given(target, args);
                    Some(Resume::Step)
                }
                b'c' => {
                    move_pc_if_given(target, args);
                    Some(Resume::Continue)
                }
                // 'k' and anything unrecognized get an empty reply; unknown
                // commands must stay non-fatal so newer hosts keep working.
                _ => None,
            };

            if let Some(resume) = resume {
                if resume == Resume::Step {
                    self.step.plant(target);
                }
                return resume;
            }
            packet::send_packet(link, self.outbound.as_bytes());
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

fn write_stop_reply(out: &mut PacketBuf, signal: Signal) {
    out.clear();
    // Three bytes always fit.
    let _ = out.push(b'S');
    let _ = out.push_hex_byte(signal.as_u8());
}

fn reply_status(out: &mut PacketBuf, result: Result<(), CommandError>) {
    let text = match result {
        Ok(()) => b"OK".as_slice(),
        Err(err) => err.reply_code(),
    };
    out.clear();
    let _ = out.extend_from_slice(text);
}

fn read_registers_reply<T: TargetContext>(out: &mut PacketBuf, target: &mut T) {
    for byte in target.registers().to_wire() {
        // 2 * NUMREGBYTES digits always fit.
        let _ = out.push_hex_byte(byte);
    }
}

fn write_registers<T: TargetContext>(target: &mut T, args: &[u8]) -> Result<(), CommandError> {
    let mut wire = [0u8; NUMREGBYTES];
    hex::decode_bytes(args, &mut wire).ok_or(CommandError::MalformedRegisterWrite)?;
    *target.registers_mut() = RegisterFile::from_wire(&wire);
    Ok(())
}

fn read_memory_reply<T: TargetContext>(
    out: &mut PacketBuf,
    target: &mut T,
    args: &[u8],
) -> Result<(), CommandError> {
    let mut cursor = HexCursor::new(args);
    let addr = cursor.parse_int().ok_or(CommandError::MalformedMemoryRead)?;
    if !cursor.expect(b',') {
        return Err(CommandError::MalformedMemoryRead);
    }
    let count = cursor.parse_int().ok_or(CommandError::MalformedMemoryRead)?;
    let count = count as usize;
    if count > MAX_TRANSFER_BYTES {
        return Err(CommandError::MalformedMemoryRead);
    }
    let base = addr as u16;
    for offset in 0..count as u16 {
        let byte = target.read_byte(base.wrapping_add(offset));
        out.push_hex_byte(byte)
            .map_err(|_| CommandError::MalformedMemoryRead)?;
    }
    Ok(())
}

fn write_memory<T: TargetContext>(target: &mut T, args: &[u8]) -> Result<(), CommandError> {
    let mut cursor = HexCursor::new(args);
    let addr = cursor.parse_int().ok_or(CommandError::MalformedMemoryWrite)?;
    if !cursor.expect(b',') {
        return Err(CommandError::MalformedMemoryWrite);
    }
    let count = cursor.parse_int().ok_or(CommandError::MalformedMemoryWrite)?;
    if !cursor.expect(b':') {
        return Err(CommandError::MalformedMemoryWrite);
    }
    let count = count as usize;
    if count > MAX_TRANSFER_BYTES {
        return Err(CommandError::MalformedMemoryWrite);
    }
    // Decode fully before touching memory so a malformed blob has no
    // partial effect.
    let mut scratch = [0u8; MAX_TRANSFER_BYTES];
    hex::decode_bytes(cursor.rest(), &mut scratch[..count])
        .ok_or(CommandError::MalformedMemoryWrite)?;
    let base = addr as u16;
    for (offset, byte) in scratch[..count].iter().enumerate() {
        target.write_byte(base.wrapping_add(offset as u16), *byte);
    }
    Ok(())
}

fn move_pc_if_given<T: TargetContext>(target: &mut T, args: &[u8]) {
    if let Some(addr) = HexCursor::new(args).parse_int() {
        target.set_pc(addr as u16);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::{Agent, CommandError, Resume};
    use crate::registers::RegisterFile;
    use crate::signal::{Signal, VEC_BREAKPOINT, VEC_NMI, VEC_TRAP};
    use crate::step::TRAP_OPCODE;
    use crate::target::TargetContext;
    use crate::transport::ByteTransport;

    struct ScriptedLink {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl ByteTransport for ScriptedLink {
        fn send_byte(&mut self, byte: u8) {
            self.output.push(byte);
        }

        fn recv_byte(&mut self) -> u8 {
            self.input.pop_front().expect("script exhausted")
        }
    }

    struct FlatTarget {
        memory: Vec<u8>,
        regs: RegisterFile,
    }

    impl FlatTarget {
        fn new() -> Self {
            Self {
                memory: vec![0; 0x1_0000],
                regs: RegisterFile::default(),
            }
        }
    }

    impl TargetContext for FlatTarget {
        fn read_byte(&mut self, addr: u16) -> u8 {
            self.memory[usize::from(addr)]
        }

        fn write_byte(&mut self, addr: u16, value: u8) {
            self.memory[usize::from(addr)] = value;
        }

        fn registers(&self) -> &RegisterFile {
            &self.regs
        }

        fn registers_mut(&mut self) -> &mut RegisterFile {
            &mut self.regs
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let checksum = payload
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        let mut framed = vec![b'$'];
        framed.extend_from_slice(payload);
        framed.push(b'#');
        framed.push(crate::hex::high_nibble(checksum));
        framed.push(crate::hex::low_nibble(checksum));
        framed
    }

    /// Host-side script: ack the pending stub packet, then send each
    /// command. The stub consumes one '+' per packet it sends.
    fn script(commands: &[&[u8]]) -> ScriptedLink {
        let mut input = Vec::new();
        for command in commands {
            input.push(b'+');
            input.extend_from_slice(&frame(command));
        }
        ScriptedLink {
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }

    /// Splits the stub's raw output into framed packets, skipping acks and
    /// sequence-id echoes, and expands run-length encoding.
    fn sent_packets(output: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut index = 0;
        while index < output.len() {
            if output[index] != b'$' {
                index += 1;
                continue;
            }
            index += 1;
            let mut payload = Vec::new();
            while output[index] != b'#' {
                if output[index] == b'*' {
                    let run = usize::from(output[index + 1]) - 29;
                    let byte = *payload.last().expect("run without preceding byte");
                    for _ in 1..run {
                        payload.push(byte);
                    }
                    index += 2;
                } else {
                    payload.push(output[index]);
                    index += 1;
                }
            }
            index += 3;
            packets.push(payload);
        }
        packets
    }

    #[test]
    fn stop_reply_carries_the_vector_signal() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"c"]);
        let resume = agent.handle_exception(VEC_NMI, &mut target, &mut link);
        assert_eq!(resume, Resume::Continue);
        assert_eq!(agent.last_signal(), Signal::Int);
        assert_eq!(sent_packets(&link.output), vec![b"S02".to_vec()]);
    }

    #[test]
    fn query_repeats_the_stop_reply() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"?", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(
            sent_packets(&link.output),
            vec![b"S05".to_vec(), b"S05".to_vec()]
        );
    }

    #[test]
    fn register_blob_round_trips_through_g_commands() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();

        let mut blob = Vec::from(&b"G"[..]);
        let regs = RegisterFile {
            a: 0x12,
            hl: 0xBEEF,
            pc: 0x0150,
            ..RegisterFile::default()
        };
        for byte in regs.to_wire() {
            blob.push(crate::hex::high_nibble(byte));
            blob.push(crate::hex::low_nibble(byte));
        }

        let mut link = script(&[blob.as_slice(), b"g", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);

        assert_eq!(target.regs, regs);
        let packets = sent_packets(&link.output);
        assert_eq!(packets[1], b"OK");
        assert_eq!(packets[2], blob[1..].to_vec());
    }

    #[test]
    fn short_register_blob_is_rejected_untouched() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        target.regs.hl = 0x1234;
        let mut link = script(&[b"G0011", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(target.regs.hl, 0x1234);
        assert_eq!(sent_packets(&link.output)[1], b"E03");
    }

    #[test]
    fn memory_read_returns_hex_bytes() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        target.memory[0x1000..0x1004].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut link = script(&[b"m1000,4", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(sent_packets(&link.output)[1], b"deadbeef");
    }

    #[test]
    fn oversized_memory_read_is_an_error() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"m0,80", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(sent_packets(&link.output)[1], b"E01");
    }

    #[test]
    fn memory_write_applies_bytes_and_acknowledges() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"M2000,3:aabbcc", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(&target.memory[0x2000..0x2003], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(sent_packets(&link.output)[1], b"OK");
    }

    #[test]
    fn malformed_memory_write_has_no_partial_effect() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        // Data shorter than the declared count.
        let mut link = script(&[b"M2000,3:aabb", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(&target.memory[0x2000..0x2003], &[0, 0, 0]);
        assert_eq!(sent_packets(&link.output)[1], b"E02");
    }

    #[test]
    fn unknown_and_kill_commands_reply_empty() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"qSupported", b"k", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        let packets = sent_packets(&link.output);
        assert!(packets[1].is_empty());
        assert!(packets[2].is_empty());
    }

    #[test]
    fn debug_toggle_replies_empty_and_flips_the_flag() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"d", b"c"]);
        agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert!(agent.trace_enabled());
        assert!(sent_packets(&link.output)[1].is_empty());
    }

    #[test]
    fn continue_with_address_moves_pc() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        let mut link = script(&[b"c1f00"]);
        let resume = agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(resume, Resume::Continue);
        assert_eq!(target.pc(), 0x1F00);
    }

    #[test]
    fn step_plants_trap_and_breakpoint_entry_restores() {
        let mut agent = Agent::new();
        let mut target = FlatTarget::new();
        target.regs.pc = 0x0100;
        // ld a,n; nop
        target.memory[0x0100] = 0x3E;
        target.memory[0x0101] = 0x42;
        target.memory[0x0102] = 0x00;

        let mut link = script(&[b"s"]);
        let resume = agent.handle_exception(VEC_TRAP, &mut target, &mut link);
        assert_eq!(resume, Resume::Step);
        assert_eq!(target.memory[0x0102], TRAP_OPCODE);
        assert_eq!(agent.planted_trap().map(|t| t.addr), Some(0x0102));

        // The trap executed: hardware left PC just past the 1-byte trap.
        target.regs.pc = 0x0103;
        let mut link = script(&[b"c"]);
        agent.handle_exception(VEC_BREAKPOINT, &mut target, &mut link);
        assert_eq!(target.pc(), 0x0102);
        assert_eq!(target.memory[0x0102], 0x00);
        assert_eq!(agent.planted_trap(), None);
        assert_eq!(sent_packets(&link.output), vec![b"S05".to_vec()]);
    }

    #[test]
    fn error_reply_codes_are_stable() {
        assert_eq!(CommandError::MalformedMemoryRead.reply_code(), b"E01");
        assert_eq!(CommandError::MalformedMemoryWrite.reply_code(), b"E02");
        assert_eq!(CommandError::MalformedRegisterWrite.reply_code(), b"E03");
    }
}
