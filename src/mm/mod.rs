//! Memory management interface for the syscall layer
//!
//! Provides:
//! - User virtual address type and the user/kernel boundary
//! - The [`AddressSpace`] seam onto the paging code
//! - A software [`PageDirectory`] implementing it
//!
//! # Security Principles
//! - User addresses are plain numbers until validated
//! - No raw pointer is ever formed from a user address

mod address;
mod pagedir;

pub use address::{VirtAddr, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, PHYS_BASE, WORD_SIZE};
pub use pagedir::{AddressSpace, Frame, MappingError, PageDirectory, PageFlags};
