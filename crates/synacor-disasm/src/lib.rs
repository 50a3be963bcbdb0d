//! Disassembler and guest-output text printer for the Synacor-ISA.

mod disasm;
mod printer;

pub use disasm::{disassemble_lines, disassemble_stream};
pub use printer::{Printer, PrinterMode};
