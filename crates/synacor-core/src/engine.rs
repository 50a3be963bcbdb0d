//! Execution engine: opcode dispatch, arithmetic, control flow, I/O.

use crate::image::Image;
use crate::operand::{decode, Operand};

/// 15-bit arithmetic modulus.
const MOD: u32 = 0x8000;

/// Byte size of each opcode, indexed by opcode number `0..22`.
const OP_SIZE: [usize; 22] = [
    1, 3, 2, 2, 4, 4, 2, 3, 3, 4, 4, 4, 4, 4, 3, 3, 3, 2, 1, 2, 2, 1,
];

/// Why the machine is no longer runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Executed opcode 0.
    Halt,
    /// An operand at `address` decoded to neither a literal nor a register.
    InvalidOperand { address: usize },
    /// `pop`/`ret` was executed against an empty stack.
    StackUnderflow { address: usize },
    /// `ip` ran past the end of memory.
    OutOfRange,
    /// An opcode number outside `0..22` was fetched.
    UnknownOpcode { address: usize, opcode: i16 },
    /// The host's input source returned EOF.
    InputEof,
    /// `mod` was executed with a zero divisor.
    DivideByZero { address: usize },
}

/// Why [`Machine::run`] returned control to the caller without halting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The machine halted; see the carried [`HaltReason`].
    Halted(HaltReason),
    /// A breakpoint (or a forced single-instruction break) was hit.
    Break,
}

/// Host-provided I/O: a line of input text, and a character sink.
///
/// The engine never touches a terminal directly; this is the entire I/O
/// surface.
pub trait HostIo {
    /// Requests one line of input (without its trailing newline).
    /// `None` signals EOF.
    fn read_line(&mut self) -> Option<String>;

    /// Emits one guest character.
    fn emit(&mut self, c: char);
}

/// Breakpoints and interrupt flag the engine consults while running.
///
/// Kept separate from [`Image`] because breakpoints are a debugging
/// concern, not part of guest-visible machine state.
#[derive(Debug, Default)]
pub struct Breaks {
    addresses: Vec<usize>,
}

impl Breaks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: usize) {
        self.addresses.retain(|&a| a != addr);
        self.addresses.push(addr);
    }

    pub fn remove(&mut self, addr: usize) {
        self.addresses.retain(|&a| a != addr);
    }

    #[must_use]
    pub fn list(&self) -> &[usize] {
        &self.addresses
    }

    #[must_use]
    fn contains(&self, addr: usize) -> bool {
        self.addresses.contains(&addr)
    }

    #[must_use]
    fn intersects(&self, range: std::ops::Range<usize>) -> bool {
        self.addresses.iter().any(|&a| range.contains(&a))
    }
}

/// Outcome of a single `run` pass: whether a watched address was touched,
/// used to implement the "break on rval/lval of a breakpoint" rule, and
/// whether the instruction bailed out early because of an interrupt.
#[derive(Debug, Default)]
struct StepEffects {
    touched_breakpoint: bool,
    aborted: bool,
}

/// Opcode size for `op`, or `None` if `op` is unknown.
#[must_use]
pub fn op_size(op: i16) -> Option<usize> {
    usize::try_from(op).ok().filter(|&o| o < 22).map(|o| OP_SIZE[o])
}

/// Drives an [`Image`] according to the Synacor ISA.
///
/// The machine itself holds no I/O; callers pass a [`HostIo`] for the
/// duration of a `run` call, which is what lets the same `Machine` run
/// headless against canned input in tests.
pub struct Machine {
    pub image: Image,
    halted: Option<HaltReason>,
    callstack: Vec<usize>,
}

impl Machine {
    #[must_use]
    pub fn new(image: Image) -> Self {
        let ip = image.ip;
        Self {
            image,
            halted: None,
            callstack: vec![ip],
        }
    }

    /// Addresses of the still-pending `call` instructions, oldest first —
    /// a debugger-facing shadow of control flow, separate from the guest's
    /// own `image.stack` (which holds return addresses, not call sites).
    #[must_use]
    pub fn callstack(&self) -> &[usize] {
        &self.callstack
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    #[must_use]
    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted
    }

    /// Reloads the image from its raw program bytes and clears halt state.
    pub fn reset(&mut self) {
        self.image.reset();
        self.halted = None;
        self.callstack = vec![self.image.ip];
    }

    /// Runs until halt or a breakpoint, with no single-step forcing.
    pub fn run(&mut self, io: &mut dyn HostIo, breaks: &Breaks, interrupted: &dyn Fn() -> bool) -> StopReason {
        self.run_inner(io, breaks, interrupted, false)
    }

    /// Executes exactly one instruction, then stops (`next`/`n`).
    pub fn run_next(&mut self, io: &mut dyn HostIo, breaks: &Breaks, interrupted: &dyn Fn() -> bool) -> StopReason {
        self.run_inner(io, breaks, interrupted, true)
    }

    fn run_inner(
        &mut self,
        io: &mut dyn HostIo,
        breaks: &Breaks,
        interrupted: &dyn Fn() -> bool,
        break_after_one: bool,
    ) -> StopReason {
        if let Some(reason) = self.halted {
            return StopReason::Halted(reason);
        }

        loop {
            if interrupted() {
                return StopReason::Break;
            }

            match self.step(io, breaks, interrupted) {
                Ok(effects) => {
                    if let Some(reason) = self.halted {
                        return StopReason::Halted(reason);
                    }
                    if effects.aborted {
                        return StopReason::Break;
                    }
                    if break_after_one || effects.touched_breakpoint {
                        return StopReason::Break;
                    }
                    if self.next_instruction_is_watched(breaks) {
                        return StopReason::Break;
                    }
                }
                Err(reason) => {
                    self.halted = Some(reason);
                    return StopReason::Halted(reason);
                }
            }
        }
    }

    fn next_instruction_is_watched(&self, breaks: &Breaks) -> bool {
        let ip = self.image.ip;
        if ip >= self.image.mem.len() {
            return false;
        }
        let Some(size) = op_size(self.image.mem[ip]) else {
            return false;
        };
        breaks.intersects(ip..ip + size)
    }

    /// Reads an operand's value, applying register indirection.
    fn rval(&mut self, addr: usize, breaks: &Breaks, effects: &mut StepEffects) -> Result<u16, HaltReason> {
        if breaks.contains(addr) {
            effects.touched_breakpoint = true;
        }
        match decode(self.image.mem[addr]) {
            Operand::Literal(v) => Ok(v),
            Operand::Register(r) => Ok(self.image.reg[r as usize]),
            Operand::Invalid(_) => Err(HaltReason::InvalidOperand { address: self.image.ip }),
        }
    }

    /// Writes a value through a destination operand at `addr`.
    ///
    /// A non-negative destination word addresses `mem` directly; there is
    /// no bounds check on the target address — an out-of-range write is
    /// silently ignored.
    fn lval(&mut self, addr: usize, value: u16, breaks: &Breaks, effects: &mut StepEffects) -> Result<(), HaltReason> {
        match decode(self.image.mem[addr]) {
            Operand::Literal(target) => {
                let target = target as usize;
                if breaks.contains(target) {
                    effects.touched_breakpoint = true;
                }
                if target < self.image.mem.len() {
                    self.image.mem[target] = value as i16;
                }
                Ok(())
            }
            Operand::Register(r) => {
                self.image.reg[r as usize] = value;
                Ok(())
            }
            Operand::Invalid(_) => Err(HaltReason::InvalidOperand { address: self.image.ip }),
        }
    }

    /// Executes one instruction. `ip` is only advanced on success; on
    /// decode failure it is left pointing at the instruction that failed.
    fn step(&mut self, io: &mut dyn HostIo, breaks: &Breaks, interrupted: &dyn Fn() -> bool) -> Result<StepEffects, HaltReason> {
        let ip = self.image.ip;
        let mem_len = self.image.mem.len();
        if ip >= mem_len {
            return Err(HaltReason::OutOfRange);
        }

        let mut effects = StepEffects::default();
        let op = self.image.mem[ip];

        macro_rules! need {
            ($addr:expr) => {{
                let a = $addr;
                if a >= mem_len {
                    return Err(HaltReason::InvalidOperand { address: ip });
                }
                a
            }};
        }

        match op {
            0 => {
                self.halted = Some(HaltReason::Halt);
            }
            1 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                self.lval(need!(ip + 1), b, breaks, &mut effects)?;
                self.image.ip = ip + 3;
            }
            2 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)?;
                self.image.stack.push(a);
                self.image.ip = ip + 2;
            }
            3 => {
                let Some(x) = self.image.stack.pop() else {
                    return Err(HaltReason::StackUnderflow { address: ip });
                };
                self.lval(need!(ip + 1), x, breaks, &mut effects)?;
                self.image.ip = ip + 2;
            }
            4 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                self.lval(need!(ip + 1), u16::from(b == c), breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            5 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                self.lval(need!(ip + 1), u16::from(b > c), breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            6 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)?;
                self.image.ip = a as usize;
            }
            7 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)?;
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                self.image.ip = if a != 0 { b as usize } else { ip + 3 };
            }
            8 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)?;
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                self.image.ip = if a == 0 { b as usize } else { ip + 3 };
            }
            9 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                let sum = (u32::from(b) + u32::from(c)) % MOD;
                self.lval(need!(ip + 1), sum as u16, breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            10 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                let product = (u32::from(b) * u32::from(c)) % MOD;
                self.lval(need!(ip + 1), product as u16, breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            11 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                if c == 0 {
                    return Err(HaltReason::DivideByZero { address: ip });
                }
                self.lval(need!(ip + 1), b % c, breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            12 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                self.lval(need!(ip + 1), b & c, breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            13 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                let c = self.rval(need!(ip + 3), breaks, &mut effects)?;
                self.lval(need!(ip + 1), b | c, breaks, &mut effects)?;
                self.image.ip = ip + 4;
            }
            14 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                self.lval(need!(ip + 1), (!b) & 0x7FFF, breaks, &mut effects)?;
                self.image.ip = ip + 3;
            }
            15 => {
                let b = self.rval(need!(ip + 2), breaks, &mut effects)? as usize;
                if breaks.contains(b) {
                    effects.touched_breakpoint = true;
                }
                let value = *self.image.mem.get(b).ok_or(HaltReason::InvalidOperand { address: ip })? as u16;
                self.lval(need!(ip + 1), value, breaks, &mut effects)?;
                self.image.ip = ip + 3;
            }
            16 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)? as usize;
                let b = self.rval(need!(ip + 2), breaks, &mut effects)?;
                if breaks.contains(a) {
                    effects.touched_breakpoint = true;
                }
                if a < mem_len {
                    self.image.mem[a] = b as i16;
                }
                self.image.ip = ip + 3;
            }
            17 => {
                let a = self.rval(need!(ip + 1), breaks, &mut effects)?;
                self.image.stack.push((ip + 2) as u16);
                self.callstack.push(ip);
                self.image.ip = a as usize;
            }
            18 => {
                let Some(a) = self.image.stack.pop() else {
                    return Err(HaltReason::StackUnderflow { address: ip });
                };
                self.callstack.pop();
                self.image.ip = a as usize;
            }
            19 => {
                let c = self.rval(need!(ip + 1), breaks, &mut effects)?;
                io.emit(char::from_u32(u32::from(c)).unwrap_or('\u{fffd}'));
                self.image.ip = ip + 2;
            }
            20 => {
                if self.image.in_queue.is_empty() {
                    let Some(line) = io.read_line() else {
                        return Err(HaltReason::InputEof);
                    };
                    // A command-mode escape (e.g. a `:`-prefixed line in play
                    // mode) reads as a line here but delivers no guest
                    // character; leave `ip` on this `in` so it re-reads once
                    // the command has been handled.
                    if interrupted() {
                        effects.aborted = true;
                        return Ok(effects);
                    }
                    self.image.in_queue.push(b'\n');
                    self.image.in_queue.extend(line.bytes().rev());
                }
                let c = self.image.in_queue.pop().unwrap_or(b'\n');
                self.lval(need!(ip + 1), u16::from(c), breaks, &mut effects)?;
                self.image.ip = ip + 2;
            }
            21 => {
                self.image.ip = ip + 1;
            }
            other => {
                return Err(HaltReason::UnknownOpcode { address: ip, opcode: other });
            }
        }

        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::pack;

    struct ScriptedIo {
        lines: Vec<String>,
        out: String,
    }

    impl ScriptedIo {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().rev().map(std::string::ToString::to_string).collect(),
                out: String::new(),
            }
        }
    }

    impl HostIo for ScriptedIo {
        fn read_line(&mut self) -> Option<String> {
            self.lines.pop()
        }

        fn emit(&mut self, c: char) {
            self.out.push(c);
        }
    }

    fn never_interrupted() -> bool {
        false
    }

    #[test]
    fn self_test_program_outputs_a_single_control_character() {
        let raw = pack(&[9, -32768, -32767, 4, 19, -32768, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        let stop = machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(stop, StopReason::Halted(HaltReason::Halt));
        assert_eq!(io.out, "\u{4}");
    }

    #[test]
    fn call_then_ret_returns_to_call_plus_two() {
        // call 6; halt; noop*3; ret
        let raw = pack(&[17, 6, 0, 21, 21, 21, 18]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(machine.halt_reason(), Some(HaltReason::Halt));
        assert_eq!(machine.image.ip, 2);
        assert!(machine.image.stack.is_empty());
    }

    #[test]
    fn input_is_delivered_char_by_char_then_newline() {
        // in r0; out r0 (x4), then halt -- echoes each character read back
        let raw = pack(&[
            20, -32768, 19, -32768, 20, -32768, 19, -32768, 20, -32768, 19, -32768, 20, -32768,
            19, -32768, 0,
        ]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&["abc"]);
        let breaks = Breaks::new();

        machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(io.out, "abc\n");
    }

    #[test]
    fn decode_failure_halts_with_ip_at_the_instruction() {
        let raw = pack(&[1, -1, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(
            machine.halt_reason(),
            Some(HaltReason::InvalidOperand { address: 0 })
        );
        assert_eq!(machine.image.ip, 0);
    }

    #[test]
    fn pop_on_empty_stack_halts() {
        let raw = pack(&[3, -32768]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(
            machine.halt_reason(),
            Some(HaltReason::StackUnderflow { address: 0 })
        );
    }

    #[test]
    fn breakpoint_pauses_before_the_watched_address() {
        let raw = pack(&[21, 21, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let mut breaks = Breaks::new();
        breaks.add(1);

        let stop = machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(stop, StopReason::Break);
        assert_eq!(machine.image.ip, 1);
    }

    #[test]
    fn arithmetic_wraps_modulo_0x8000() {
        // add r0, 0x7fff, 2 -> 1
        let raw = pack(&[9, -32768, 0x7FFF, 2, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(machine.image.reg[0], 1);
    }

    #[test]
    fn mod_by_zero_halts_instead_of_panicking() {
        // mod r0, 5, 0
        let raw = pack(&[11, -32768, 5, 0, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let mut io = ScriptedIo::new(&[]);
        let breaks = Breaks::new();

        let stop = machine.run(&mut io, &breaks, &never_interrupted);

        assert_eq!(stop, StopReason::Halted(HaltReason::DivideByZero { address: 0 }));
    }

    /// A `HostIo` whose `read_line` behaves like a play-mode command-mode
    /// escape: it answers the blocking read, but flips the shared
    /// `intercepted` cell (also read by the caller's `interrupted` closure)
    /// as a side effect, the way `PlayIo` does for a `:`-prefixed line.
    struct InterceptingIo<'a> {
        intercepted: &'a std::cell::Cell<bool>,
    }

    impl HostIo for InterceptingIo<'_> {
        fn read_line(&mut self) -> Option<String> {
            self.intercepted.set(true);
            Some(String::new())
        }

        fn emit(&mut self, _c: char) {}
    }

    #[test]
    fn an_interrupted_in_delivers_no_character_and_leaves_ip_on_the_in() {
        // in r0; halt
        let raw = pack(&[20, -32768, 0]);
        let mut machine = Machine::new(Image::new(raw));
        let intercepted = std::cell::Cell::new(false);
        let mut io = InterceptingIo {
            intercepted: &intercepted,
        };
        let breaks = Breaks::new();

        let stop = machine.run(&mut io, &breaks, &|| intercepted.get());

        assert_eq!(stop, StopReason::Break);
        assert!(!machine.is_halted());
        assert_eq!(machine.image.ip, 0);
        assert_eq!(machine.image.reg[0], 0);
        assert!(machine.image.in_queue.is_empty());
    }
}
