//! Device interfaces used by the syscall layer
//!
//! All drivers follow these security principles:
//! - User data reaches a device only after it was copied into the kernel
//! - No panics on invalid input (return errors)

pub mod console;
