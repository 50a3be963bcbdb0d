//! Core types for the 15-bit Synacor-ISA virtual machine.
//!
//! This crate has no knowledge of terminals, files, or the debugger; it
//! only models the guest's memory/register/stack state and how it
//! evolves one instruction at a time. See [`engine::Machine`] and
//! [`engine::HostIo`].

mod engine;
mod image;
mod operand;
mod word;

pub use engine::{op_size, Breaks, HaltReason, HostIo, Machine, StopReason};
pub use image::{Image, SnapshotError};
pub use operand::{decode, Operand, REGISTER_COUNT};
pub use word::{pack, unpack};
