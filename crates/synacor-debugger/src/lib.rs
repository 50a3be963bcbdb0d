//! Interactive debugger shell and memory/register dump rendering.

mod dump;
mod shell;

pub use dump::{hexdump, mem_dump};
pub use shell::Debugger;
