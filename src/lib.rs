//! PantherOS user-program syscall layer
//!
//! The boundary between user processes and the kernel: a software interrupt
//! from ring 3 lands in [`trap::handle_syscall`], which hands the saved frame
//! to [`Kernel::dispatch`].
//!
//! # Pipeline
//! - Validate the user stack pointer and read the syscall number
//! - Marshal up to three argument words, validating each one
//! - Run the handler against the caller's [`Process`]
//! - Store the result in `eax`, or tear the process down
//!
//! # Security Model
//! - Every user address is checked before it is touched ([`syscall::validate`])
//! - Protocol violations kill the offending process, never the kernel
//! - Shared state is reached only through explicit locks: the filesystem
//!   lock ([`fs::FsLock`]) and the process registry ([`process::ProcessRegistry`])
//!
//! # Collaborators
//! The scheduler, loader, page tables, filesystem and console live outside
//! this crate and are reached through the traits in [`process`], [`mm`],
//! [`fs`] and [`drivers::console`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod drivers;
pub mod fd;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testutil;

pub use kernel::Kernel;
pub use process::Process;
pub use trap::{TrapExit, TrapFrame};
