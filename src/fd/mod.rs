//! Per-Process File Descriptors
//!
//! Each process owns one [`FdTable`]. It is touched only by the owning
//! process's kernel thread, so it carries no lock.
//!
//! # Security Properties
//! - Descriptors are bounds-checked newtypes, never raw indices
//! - A closed descriptor cannot reach its old handle
//! - Teardown drains every slot, so no handle outlives its process

pub mod table;

pub use table::{Fd, FdError, FdTable, OpenFile, Rights, FD_TABLE_SIZE};
