//! Binary entry point: load a program image and either play it or debug it.

use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use synacor_core::{Breaks, HostIo, Image, Machine, StopReason};
use synacor_debugger::Debugger;
use synacor_disasm::{Printer, PrinterMode};

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    image_path: PathBuf,
    debug: bool,
    save_dir: PathBuf,
}

fn parse_args() -> Option<CliArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut image_path = None;
    let mut debug = false;
    let mut save_dir = PathBuf::from("./saves");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--debug" => debug = true,
            "--save-dir" => {
                i += 1;
                save_dir = args.get(i).map(PathBuf::from)?;
            }
            "--help" | "-h" => return None,
            other => image_path = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    Some(CliArgs {
        image_path: image_path?,
        debug,
        save_dir,
    })
}

fn print_usage() {
    eprintln!("Usage: synacor-vm [--debug] [--save-dir <dir>] <image>");
}

fn main() {
    let Some(cli) = parse_args() else {
        print_usage();
        process::exit(1);
    };

    let raw = match std::fs::read(&cli.image_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{}: {e}", cli.image_path.display());
            process::exit(1);
        }
    };

    let machine = Machine::new(Image::new(raw));

    if cli.debug {
        run_debug(machine, cli.save_dir);
    } else {
        run_play(machine, &cli.save_dir);
    }
}

// ---------------------------------------------------------------------------
// Play mode
// ---------------------------------------------------------------------------

/// `HostIo` for play mode: reads lines from stdin, intercepting `:`-prefixed
/// lines as VM meta-commands instead of guest input, and writes guest
/// output through a relaxed (per-line) [`Printer`].
struct PlayIo<'a> {
    stdin: io::StdinLock<'static>,
    pending_command: &'a Cell<Option<String>>,
    intercepted: &'a Cell<bool>,
    printer: Printer<io::Stdout>,
}

impl HostIo for PlayIo<'_> {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = self.stdin.read_line(&mut line).ok()?;
        if n == 0 {
            return None;
        }
        let line = line.trim_end_matches(['\n', '\r']);
        if line.starts_with(':') {
            self.pending_command.set(Some(line.to_string()));
            self.intercepted.set(true);
            return Some(String::new());
        }
        Some(line.to_string())
    }

    fn emit(&mut self, c: char) {
        self.printer.print_char(c);
    }
}

fn run_play(mut machine: Machine, save_dir: &Path) {
    let pending_command: Cell<Option<String>> = Cell::new(None);
    let intercepted = Cell::new(false);
    let breaks = Breaks::new();
    let mut io = PlayIo {
        stdin: io::stdin().lock(),
        pending_command: &pending_command,
        intercepted: &intercepted,
        printer: Printer::new(io::stdout(), PrinterMode::Relaxed),
    };

    loop {
        let stop = machine.run(&mut io, &breaks, &|| intercepted.get());
        io.printer.flush();

        if intercepted.get() {
            intercepted.set(false);
            if let Some(cmd) = pending_command.take()
                && !handle_vm_command(&cmd, &mut machine, save_dir) {
                    break;
                }
            continue;
        }

        match stop {
            StopReason::Halted(_) | StopReason::Break => break,
        }
    }
}

/// Handles one `:`-prefixed VM meta-command. Returns `false` on `:quit`.
fn handle_vm_command(command: &str, machine: &mut Machine, save_dir: &Path) -> bool {
    let mut parts = command.split_whitespace();
    let op = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match op {
        ":quit" => return false,
        ":reset" => machine.reset(),
        ":dump" => {
            let file = args.first().copied().unwrap_or("dump.bin");
            if let Ok(f) = std::fs::File::create(file) {
                let _ = machine.image.dump_mem(f);
                eprintln!("\n{file:?} dumped");
            }
        }
        ":save" => {
            let name = args.first().copied().unwrap_or("save000");
            let path = save_dir.join(name);
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(f) = std::fs::File::create(&path) {
                let _ = machine.image.write_snapshot(f);
                eprintln!("\n{} saved", path.display());
            }
        }
        ":load" => {
            let name = args.first().copied().unwrap_or("save000");
            let path = save_dir.join(name);
            if path.is_file() {
                match std::fs::File::open(&path).and_then(|f| Image::read_snapshot(f).map_err(io::Error::other)) {
                    Ok(image) => {
                        *machine = Machine::new(image);
                        eprintln!("\n{} loaded", path.display());
                    }
                    Err(e) => eprintln!("\n{} failed to load: {e}", path.display()),
                }
            } else {
                eprintln!("\n{} not found", path.display());
            }
        }
        _ => {
            eprintln!(
                "VM commands\n:dump [file]\n        dump memory to file\n:reset\n        reload the machine\n:save [file]\n        save state\n:load [file]\n        load save\n:quit\n        exit the session\n:help\n        this help"
            );
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Debug mode
// ---------------------------------------------------------------------------

/// `HostIo` for debug mode: reads lines from stdin as raw guest input, and
/// writes guest output through a strict (per-character) [`Printer`].
struct DebugIo {
    stdin: io::StdinLock<'static>,
    printer: Printer<io::Stderr>,
}

impl HostIo for DebugIo {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = self.stdin.read_line(&mut line).ok()?;
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn emit(&mut self, c: char) {
        self.printer.print_char(c);
    }
}

fn run_debug(machine: Machine, save_dir: PathBuf) {
    let mut debugger = Debugger::new(machine, save_dir);
    let mut io = DebugIo {
        stdin: io::stdin().lock(),
        printer: Printer::new(io::stderr(), PrinterMode::Strict),
    };
    let interrupted = || false;

    loop {
        if debugger.should_quit() {
            break;
        }
        eprint!(": ");
        let _ = io::stderr().flush();

        let Some(line) = io.read_line() else { break };
        let mut stderr = io::stderr();
        debugger.execute(&line, &mut io, &interrupted, &mut stderr);
    }
}
