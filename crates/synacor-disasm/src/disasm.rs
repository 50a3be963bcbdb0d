//! Disassembler: stream mode (with run-coalescing) and single-line mode.

use std::ops::Range;

use synacor_core::{decode, op_size, Operand};

/// Formats one operand the way both `rval` and `lval` positions render in
/// the reference implementation — they differ only in what the *engine*
/// does with the decoded value, not in how the disassembler prints it.
fn operand_str(raw: i16) -> String {
    match decode(raw) {
        Operand::Literal(v) => format!("{v:04x}"),
        Operand::Register(r) => format!("r{r}"),
        Operand::Invalid(raw) => format!("(invalid value {:02x})", (raw as u16) & 0xFF),
    }
}

/// Mnemonic and rendered operands for the instruction at `mem[addr]`, or
/// `None` if `addr` is out of range or the opcode doesn't fit in what's
/// left of `mem`.
fn render(mem: &[i16], addr: usize) -> Option<(String, usize)> {
    let op = *mem.get(addr)?;
    let size = op_size(op);
    let has_operands = |n: usize| size.is_some_and(|s| s == n + 1) && addr + n < mem.len();

    let text = match op {
        0 => "halt".to_string(),
        1 if has_operands(2) => format!("set {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        2 if has_operands(1) => format!("push {}", operand_str(mem[addr + 1])),
        3 if has_operands(1) => format!("pop {}", operand_str(mem[addr + 1])),
        4 if has_operands(3) => format!(
            "eq {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        5 if has_operands(3) => format!(
            "gt {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        6 if has_operands(1) => format!("jmp {}", operand_str(mem[addr + 1])),
        7 if has_operands(2) => format!("jt {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        8 if has_operands(2) => format!("jf {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        9 if has_operands(3) => format!(
            "add {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        10 if has_operands(3) => format!(
            "mult {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        11 if has_operands(3) => format!(
            "mod {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        12 if has_operands(3) => format!(
            "and {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        13 if has_operands(3) => format!(
            "or {} {} {}",
            operand_str(mem[addr + 1]),
            operand_str(mem[addr + 2]),
            operand_str(mem[addr + 3])
        ),
        14 if has_operands(2) => format!("not {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        15 if has_operands(2) => format!("rmem {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        16 if has_operands(2) => format!("wmem {} {}", operand_str(mem[addr + 1]), operand_str(mem[addr + 2])),
        17 if has_operands(1) => format!("call {}", operand_str(mem[addr + 1])),
        18 => "ret".to_string(),
        19 if has_operands(1) => format!("out {}", out_operand_single_line(mem[addr + 1])),
        20 if has_operands(1) => format!("in {}", operand_str(mem[addr + 1])),
        21 => "noop".to_string(),
        other => return Some((format!("?? ({:04x})", other as u16), addr + 1)),
    };

    let size = size.unwrap_or(1);
    Some((text, addr + size))
}

/// `out`'s operand, single-line-mode rendering: a quoted char literal if
/// printable, otherwise the normal operand rendering.
fn out_operand_single_line(raw: i16) -> String {
    if let Operand::Literal(v) = decode(raw)
        && ((32..127).contains(&v) || v == 10) {
            let c = char::from_u32(u32::from(v)).unwrap_or('\u{fffd}');
            return format!("{c:?}");
        }
    operand_str(raw)
}

/// Decodes `lines` consecutive instructions starting at `addr`, one line
/// per instruction, with no run-coalescing. Used by the debugger's
/// `disasm`/`dis` command.
#[must_use]
pub fn disassemble_lines(mem: &[i16], addr: usize, lines: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut ip = addr;
    for _ in 0..lines.max(1) {
        let Some((text, next)) = render(mem, ip) else {
            break;
        };
        out.push(format!("{ip:04x}: {text}"));
        ip = next;
    }
    out
}

/// A value fed to a [`RunCoalescer`]: either a raw word (candidate for
/// coalescing into a string literal if printable) or an already-rendered
/// operand that can never coalesce (register name, invalid marker).
enum CoalesceInput {
    Word(i16),
    Rendered(String),
}

/// Coalesces a run of consecutive same-stride instructions whose operand
/// is a printable character into a single `"mnemonic \"...\""` line.
///
/// Used for two purposes: consecutive `out` instructions
/// (`stride = 2`, the instruction's own size) and consecutive raw data
/// words in a user-designated range (`stride = 1`).
struct RunCoalescer {
    mnemonic: &'static str,
    stride: usize,
    start: usize,
    last: usize,
    buf: String,
    open: bool,
}

impl RunCoalescer {
    fn new(mnemonic: &'static str, stride: usize) -> Self {
        Self {
            mnemonic,
            stride,
            start: 0,
            last: 0,
            buf: String::new(),
            open: false,
        }
    }

    fn print(&mut self, addr: usize, value: CoalesceInput, out: &mut Vec<(usize, String)>) {
        if let CoalesceInput::Word(raw) = value {
            let as_u = raw as u16;
            if (32..127).contains(&as_u) || as_u == 10 {
                let c = char::from_u32(u32::from(as_u)).unwrap_or('\u{fffd}');
                if self.open && self.last + self.stride == addr {
                    self.last = addr;
                    self.buf.push(c);
                } else {
                    self.flush(out);
                    self.start = addr;
                    self.last = addr;
                    self.buf.push(c);
                    self.open = true;
                }
                return;
            }
        }

        self.flush(out);
        let rendered = match value {
            CoalesceInput::Word(raw) => format!("{:04x}", raw as u16),
            CoalesceInput::Rendered(s) => s,
        };
        out.push((addr, format!("{} {}", self.mnemonic, rendered)));
    }

    fn flush(&mut self, out: &mut Vec<(usize, String)>) {
        if self.open {
            out.push((self.start, format!("{} {}", self.mnemonic, json_escape(&self.buf))));
            self.buf.clear();
            self.open = false;
        }
    }
}

/// Minimal JSON string escaping for the printable-ASCII-plus-newline
/// alphabet the coalescer ever sees.
fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders the whole image (or, with `raw_range` given, treats that
/// address range as raw data words rather than code) as a stream of
/// `"aaaa: text"` lines, with `out`/data runs coalesced into string
/// literals. Addresses outside `[0, mem.len())` are never disassembled.
#[must_use]
pub fn disassemble_stream(mem: &[i16], raw_range: Option<&Range<usize>>) -> Vec<String> {
    let mut out = Vec::new();
    let mut group_out = RunCoalescer::new("out", 2);
    let mut group_dw = RunCoalescer::new("dw", 1);

    let mut ip = 0usize;
    while ip < mem.len() {
        let op = mem[ip];

        if raw_range.is_some_and(|r| r.contains(&ip)) {
            group_out.flush(&mut out);
            group_dw.print(ip, CoalesceInput::Word(op), &mut out);
            ip += 1;
            continue;
        }

        if op != 19 {
            group_out.flush(&mut out);
        }

        if (0..22).contains(&op) {
            group_dw.flush(&mut out);
        }

        match op {
            19 => {
                match decode(mem.get(ip + 1).copied().unwrap_or(0)) {
                    Operand::Literal(v) if ip + 1 < mem.len() => {
                        group_out.print(ip, CoalesceInput::Word(v as i16), &mut out);
                    }
                    _ if ip + 1 < mem.len() => {
                        group_out.print(ip, CoalesceInput::Rendered(operand_str(mem[ip + 1])), &mut out);
                    }
                    _ => {
                        group_out.print(ip, CoalesceInput::Rendered("(invalid value 00)".to_string()), &mut out);
                    }
                }
                ip += 2;
            }
            0..=21 => {
                if let Some((text, next)) = render(mem, ip) {
                    out.push((ip, text));
                    ip = next;
                } else {
                    ip += 1;
                }
            }
            other => {
                group_dw.print(ip, CoalesceInput::Word(other), &mut out);
                ip += 1;
            }
        }
    }
    group_out.flush(&mut out);
    group_dw.flush(&mut out);

    out.into_iter().map(|(addr, text)| format!("{addr:04x}: {text}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_runs_of_printable_characters_coalesce_into_one_string() {
        // out 'H'; out 'i'; out '\n'; halt
        let mem = [19_i16, 72, 19, 105, 19, 10, 0];
        let lines = disassemble_stream(&mem, None);
        assert_eq!(lines[0], "0000: out \"Hi\\n\"");
        assert_eq!(lines[1], "0006: halt");
    }

    #[test]
    fn non_out_instruction_splits_the_run() {
        let mem = [19_i16, 72, 21, 19, 105, 0];
        let lines = disassemble_stream(&mem, None);
        assert_eq!(lines[0], "0000: out \"H\"");
        assert_eq!(lines[1], "0002: noop");
        assert_eq!(lines[2], "0003: out \"i\"");
    }

    #[test]
    fn non_printable_operand_splits_the_run() {
        // out 'H'; out 4 (non-printable); out 'i'
        let mem = [19_i16, 72, 19, 4, 19, 105];
        let lines = disassemble_stream(&mem, None);
        assert_eq!(lines[0], "0000: out \"H\"");
        assert_eq!(lines[1], "0002: out 0004");
        assert_eq!(lines[2], "0004: out \"i\"");
    }

    #[test]
    fn single_line_mode_renders_printable_out_as_a_char_literal() {
        let mem = [19_i16, 72, 0];
        let lines = disassemble_lines(&mem, 0, 2);
        assert_eq!(lines[0], "0000: out 'H'");
        assert_eq!(lines[1], "0002: halt");
    }

    #[test]
    fn single_line_mode_stops_at_end_of_memory() {
        let mem = [21_i16, 21];
        let lines = disassemble_lines(&mem, 0, 5);
        assert_eq!(lines, vec!["0000: noop".to_string(), "0001: noop".to_string()]);
    }

    #[test]
    fn unknown_opcode_renders_as_question_marks() {
        let mem = [254_i16];
        let lines = disassemble_lines(&mem, 0, 1);
        assert_eq!(lines[0], "0000: ?? (00fe)");
    }

    #[test]
    fn call_and_destination_operands_render_as_hex_or_register() {
        let mem = [17_i16, -32768, 6, 0];
        let lines = disassemble_lines(&mem, 0, 1);
        assert_eq!(lines[0], "0000: call r0");
    }
}
