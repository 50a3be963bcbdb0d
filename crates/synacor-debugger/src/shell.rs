//! Interactive debugger shell: breakpoints, stepping, inspection commands.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use synacor_core::{op_size, Breaks, HostIo, Machine};
use synacor_disasm::disassemble_lines;

use crate::dump::mem_dump;

/// Parses a hex integer the way the reference debugger's commands do:
/// an optional `0x`/`0X` prefix, otherwise bare hex digits.
fn parse_hex(s: &str) -> Option<i64> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    i64::from_str_radix(s, 16).ok()
}

/// Drives a [`Machine`] from line-based textual commands, printing
/// inspection output and post-run disassembly to an arbitrary sink.
pub struct Debugger {
    pub machine: Machine,
    breaks: Breaks,
    save_dir: PathBuf,
    last_command: Option<String>,
    quit: bool,
}

impl Debugger {
    #[must_use]
    pub fn new(machine: Machine, save_dir: PathBuf) -> Self {
        Self {
            machine,
            breaks: Breaks::new(),
            save_dir,
            last_command: None,
            quit: false,
        }
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Processes one command line, writing command output to `out`.
    ///
    /// A command that is only whitespace is ignored; an empty line repeats
    /// the last non-blank command.
    pub fn execute(&mut self, command: &str, io: &mut dyn HostIo, interrupted: &dyn Fn() -> bool, out: &mut dyn Write) {
        if command.is_empty() {
            if let Some(prev) = self.last_command.clone() {
                self.execute(&prev, io, interrupted, out);
            }
            return;
        }
        if command.chars().all(char::is_whitespace) {
            return;
        }
        self.last_command = Some(command.to_string());

        let mut parts = command.split_whitespace();
        let Some(op) = parts.next() else { return };
        let args: Vec<&str> = parts.collect();

        match op.to_ascii_lowercase().as_str() {
            "run" | "c" => {
                self.machine.run(io, &self.breaks, interrupted);
                self.disassemble_after_stop(out);
            }
            "next" | "n" => {
                self.machine.run_next(io, &self.breaks, interrupted);
                self.disassemble_after_stop(out);
            }
            "step" | "s" => {
                self.run_step(io, interrupted);
                self.disassemble_after_stop(out);
            }
            "finish" | "fin" => {
                self.run_stepout(io, interrupted);
                self.disassemble_after_stop(out);
            }
            "write" | "w" => self.cmd_write(&args),
            "dump" => self.cmd_dump(args.first().copied().unwrap_or("dump.bin"), out),
            "reset" => self.machine.reset(),
            "quit" | "exit" => self.quit = true,
            "save" => self.cmd_save(args.first().copied().unwrap_or("save000"), out),
            "load" => self.cmd_load(args.first().copied().unwrap_or("save000"), out),
            "find" => {
                if let Some(pos) = command.find("find") {
                    let needle = command[pos + 4..].trim();
                    if !needle.is_empty() {
                        self.cmd_find(needle, out);
                    }
                }
            }
            "b" => {
                let addr = args.first().and_then(|a| parse_hex(a)).map_or(self.machine.image.ip, |a| a as usize);
                self.breaks.add(addr);
            }
            "bl" => {
                let lines: Vec<String> = self.breaks.list().iter().map(|a| format!(" - {a:04x}")).collect();
                let _ = writeln!(out, "{}", lines.join("\n"));
            }
            "bd" => {
                let addr = args.first().and_then(|a| parse_hex(a)).map_or(self.machine.image.ip, |a| a as usize);
                self.breaks.remove(addr);
            }
            "bt" => self.cmd_backtrace(out),
            "stack" => {
                let stack: Vec<i16> = self.machine.image.stack.iter().map(|&w| w as i16).collect();
                let _ = writeln!(out, "{}", mem_dump(&stack, 0, stack.len(), 16));
            }
            "mem" => {
                if let Some(addr) = args.first().and_then(|a| parse_hex(a)) {
                    let addr = addr as usize;
                    let _ = writeln!(out, "{}", mem_dump(&self.machine.image.mem, addr, addr + 16 * 5, 16));
                }
            }
            "regs" => {
                let regs: Vec<i16> = self.machine.image.reg.iter().map(|&w| w as i16).collect();
                let _ = writeln!(out, "{}", mem_dump(&regs, 0, regs.len(), 16));
            }
            "disasm" | "dis" => self.cmd_disasm(&args, out),
            _ => {
                let _ = writeln!(out, "{HELP}");
            }
        }
    }

    fn disassemble_after_stop(&self, out: &mut dyn Write) {
        let lines = disassemble_lines(&self.machine.image.mem, self.machine.image.ip, 5);
        let _ = writeln!(out, "\n{}", lines.join("\n"));
    }

    fn run_step(&mut self, io: &mut dyn HostIo, interrupted: &dyn Fn() -> bool) {
        let ip = self.machine.image.ip;
        if self.machine.image.mem.get(ip) == Some(&17) {
            if let Some(size) = op_size(17) {
                self.breaks.add(ip + size);
            }
            self.machine.run(io, &self.breaks, interrupted);
        } else {
            self.machine.run_next(io, &self.breaks, interrupted);
        }
    }

    fn run_stepout(&mut self, io: &mut dyn HostIo, interrupted: &dyn Fn() -> bool) {
        let Some(&addr) = self.machine.callstack().last() else {
            return;
        };
        let op = self.machine.image.mem.get(addr).copied().unwrap_or(0);
        let ret = addr + op_size(op).unwrap_or(1);
        self.breaks.add(ret);
        self.machine.run(io, &self.breaks, interrupted);
    }

    fn cmd_write(&mut self, args: &[&str]) {
        if args.len() < 2 {
            return;
        }
        let target = args[0];
        let values: Option<Vec<i64>> = args[1..].iter().map(|s| parse_hex(s)).collect();
        let Some(values) = values else { return };

        if target.to_ascii_lowercase().starts_with('r') {
            if let Some(&last) = values.last()
                && let Some(reg) = parse_hex(&target[1..]) {
                    let reg = reg as usize;
                    if reg < self.machine.image.reg.len() {
                        self.machine.image.reg[reg] = last as u16;
                    }
                }
        } else if let Some(addr) = parse_hex(target) {
            let base = addr as usize;
            for (offset, v) in values.into_iter().enumerate() {
                let addr = base + offset;
                if addr < self.machine.image.mem.len() {
                    self.machine.image.mem[addr] = v as i16;
                }
            }
        }
    }

    fn cmd_dump(&self, file: &str, out: &mut dyn Write) {
        if let Ok(f) = fs::File::create(file) {
            let _ = self.machine.image.dump_mem(f);
            let _ = writeln!(out, "\n{file:?} dumped");
        }
    }

    fn cmd_save(&self, name: &str, out: &mut dyn Write) {
        let path = self.save_dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(f) = fs::File::create(&path) {
            let _ = self.machine.image.write_snapshot(f);
            let _ = writeln!(out, "\n{} saved", path.display());
        }
    }

    fn cmd_load(&mut self, name: &str, out: &mut dyn Write) {
        let path = self.save_dir.join(name);
        if Path::new(&path).is_file() {
            match fs::File::open(&path).and_then(|f| {
                synacor_core::Image::read_snapshot(f).map_err(std::io::Error::other)
            }) {
                Ok(image) => {
                    self.machine = Machine::new(image);
                    let _ = writeln!(out, "\n{} loaded", path.display());
                }
                Err(e) => {
                    let _ = writeln!(out, "\n{} failed to load: {e}", path.display());
                }
            }
        } else {
            let _ = writeln!(out, "\n{} not found", path.display());
        }
    }

    fn cmd_find(&self, needle: &str, out: &mut dyn Write) {
        let needle = needle.trim_matches(|c| c == '"' || c == '\'');
        let pattern: Vec<i16> = needle.bytes().map(i16::from).collect();
        if pattern.is_empty() {
            return;
        }
        let mem = &self.machine.image.mem;
        let mut start = 0;
        while start < mem.len() {
            if start + pattern.len() <= mem.len() && mem[start..start + pattern.len()] == pattern[..] {
                let addr = start;
                let _ = writeln!(out, "{}\n", mem_dump(mem, addr, addr + 16, 16));
                start += pattern.len();
            } else {
                start += 1;
            }
        }
    }

    fn cmd_backtrace(&self, out: &mut dyn Write) {
        let lines: Vec<String> = self
            .machine
            .callstack()
            .iter()
            .flat_map(|&addr| disassemble_lines(&self.machine.image.mem, addr, 1))
            .map(|line| format!(" - {line}"))
            .collect();
        let _ = writeln!(out, "{}", lines.join("\n"));
    }

    fn cmd_disasm(&self, args: &[&str], out: &mut dyn Write) {
        let lines_count = if args.len() > 1 {
            args.last().and_then(|a| parse_hex(a)).unwrap_or(5) as usize
        } else {
            5
        };
        let addr = args.first().and_then(|a| parse_hex(a)).map_or(self.machine.image.ip, |a| a as usize);
        let lines = disassemble_lines(&self.machine.image.mem, addr, lines_count);
        let _ = writeln!(out, "\n{}", lines.join("\n"));
    }
}

const HELP: &str = "Debugger commands:
reset
        restart the executable
c, run
        continue execution
s, step
        step over calls
n, next
        next instruction
fin, finish
        step out
dis [addr] [lines]
        disassemble
dump [file]
        dump memory to file
save [file]
        save state
load [file]
        load save
find [text]
        search for text
b [addr]
        add exec/memory breakpoint
bl
        list breakpoints
bd [addr]
        remove breakpoint
bt
        print call stack
stack
        show stack
mem [addr]
        show memory
w, write [addr|reg] [value]
        write to memory or register
regs
        show registers
quit
        exit debugger
help
        this help screen";
