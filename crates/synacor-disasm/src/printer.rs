//! Buffered character output with optional ANSI color bracketing.

/// ANSI escape that opens a guest-output run.
const COLOR_START: &str = "\u{1b}[95m";
/// ANSI escape that closes a guest-output run.
const COLOR_END: &str = "\u{1b}[0m";

/// How [`Printer`] brackets guest-emitted characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterMode {
    /// Wrap each maximal run of characters (up to the next `'\n'`) once.
    Relaxed,
    /// Wrap every character individually.
    Strict,
}

/// Writes guest characters to a sink, bracketing them in color per
/// [`PrinterMode`].
pub struct Printer<W: std::io::Write> {
    sink: W,
    mode: PrinterMode,
    run_open: bool,
}

impl<W: std::io::Write> Printer<W> {
    #[must_use]
    pub fn new(sink: W, mode: PrinterMode) -> Self {
        Self {
            sink,
            mode,
            run_open: false,
        }
    }

    /// Emits one guest character.
    pub fn print_char(&mut self, c: char) {
        match self.mode {
            PrinterMode::Relaxed => {
                if c == '\n' {
                    if self.run_open {
                        let _ = write!(self.sink, "{COLOR_END}");
                    }
                    let _ = write!(self.sink, "{c}");
                    self.run_open = false;
                } else {
                    if !self.run_open {
                        let _ = write!(self.sink, "{COLOR_START}");
                    }
                    let _ = write!(self.sink, "{c}");
                    self.run_open = true;
                }
            }
            PrinterMode::Strict => {
                let _ = write!(self.sink, "{COLOR_START}{c}{COLOR_END}");
            }
        }
        let _ = self.sink.flush();
    }

    /// Closes an open relaxed run, if any.
    pub fn flush(&mut self) {
        if self.mode == PrinterMode::Relaxed && self.run_open {
            let _ = writeln!(self.sink, "{COLOR_END}");
            self.run_open = false;
        }
        let _ = self.sink.flush();
    }
}
