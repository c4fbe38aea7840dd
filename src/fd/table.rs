//! File Descriptor Table
//!
//! Per-process table mapping small integers to open files.
//!
//! # Design
//! - Fixed-size array of slots addressed by [`Fd`] indices
//! - Occupancy tracked in an explicit bitmap; the lowest free bit wins
//! - Slots 0 and 1 belong to the console and are never occupied
//! - Operations: insert, lookup, remove, drain

use alloc::vec::Vec;

use bitflags::bitflags;

/// Number of slots in a descriptor table.
pub const FD_TABLE_SIZE: usize = 128;

/// Bits of the console descriptors, never set in the occupancy bitmap.
const RESERVED_MASK: u128 = 0b11;

/// A descriptor index.
///
/// This is a newtype to prevent using arbitrary integers as table indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Standard input (console keyboard).
    pub const STDIN: Self = Self(0);

    /// Standard output (console screen).
    pub const STDOUT: Self = Self(1);

    /// First descriptor handed out by `open`.
    pub const FIRST_FILE: Self = Self(2);

    /// Interpret a raw user word as a descriptor.
    ///
    /// Returns None if the value is negative or beyond the table.
    #[inline]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < FD_TABLE_SIZE {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the value handed back to user code.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Check whether this is one of the console descriptors.
    #[inline]
    pub const fn is_console(self) -> bool {
        self.0 < Self::FIRST_FILE.0
    }

    #[inline]
    const fn bit(self) -> u128 {
        1 << self.0
    }
}

bitflags! {
    /// Operations permitted through a descriptor.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Rights: u8 {
        /// read(2) is allowed.
        const READ = 1 << 0;
        /// write(2) is allowed.
        const WRITE = 1 << 1;
        /// Read and write.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The descriptor is negative, out of range or a console descriptor.
    InvalidDescriptor,
    /// The descriptor is not open.
    NotOpen,
    /// The descriptor lacks the right for the operation.
    InsufficientRights,
    /// Every slot is occupied.
    TableFull,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidDescriptor => write!(f, "invalid descriptor"),
            Self::NotOpen => write!(f, "descriptor not open"),
            Self::InsufficientRights => write!(f, "insufficient rights"),
            Self::TableFull => write!(f, "descriptor table full"),
        }
    }
}

/// An open file: the filesystem handle plus the per-descriptor cursor.
#[derive(Debug)]
pub struct OpenFile<H> {
    handle: H,
    offset: u32,
    rights: Rights,
}

impl<H> OpenFile<H> {
    /// Wrap a freshly opened handle, positioned at the start of the file.
    pub fn new(handle: H, rights: Rights) -> Self {
        Self {
            handle,
            offset: 0,
            rights,
        }
    }

    /// The underlying handle.
    #[inline]
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// The underlying handle, mutably.
    #[inline]
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Current byte offset.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Set the byte offset. Positions past end-of-file are allowed.
    #[inline]
    pub fn seek(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Move the offset forward after a transfer.
    #[inline]
    pub fn advance(&mut self, bytes: usize) {
        self.offset = self.offset.saturating_add(bytes as u32);
    }

    /// Check that the descriptor grants `required`.
    pub fn check_rights(&self, required: Rights) -> Result<(), FdError> {
        if self.rights.contains(required) {
            Ok(())
        } else {
            Err(FdError::InsufficientRights)
        }
    }

    /// Give up the descriptor state and keep the handle.
    pub fn into_handle(self) -> H {
        self.handle
    }
}

/// Descriptor table for a process.
pub struct FdTable<H> {
    /// Bit `n` set when slot `n` holds a file.
    occupied: u128,
    slots: [Option<OpenFile<H>>; FD_TABLE_SIZE],
}

impl<H> FdTable<H> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            occupied: 0,
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Number of open files.
    pub fn len(&self) -> usize {
        self.occupied.count_ones() as usize
    }

    /// Check whether no file is open.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Find the lowest free descriptor.
    pub fn find_free(&self) -> Option<Fd> {
        let free = !(self.occupied | RESERVED_MASK);
        if free == 0 {
            None
        } else {
            Some(Fd(free.trailing_zeros()))
        }
    }

    /// Insert a file at the lowest free descriptor.
    ///
    /// Hands the file back if the table is full, so the caller can close it.
    pub fn insert(&mut self, file: OpenFile<H>) -> Result<Fd, OpenFile<H>> {
        let Some(fd) = self.find_free() else {
            return Err(file);
        };
        self.slots[fd.index()] = Some(file);
        self.occupied |= fd.bit();
        Ok(fd)
    }

    /// Look up an open file.
    pub fn lookup(&self, fd: Fd) -> Result<&OpenFile<H>, FdError> {
        self.check(fd)?;
        self.slots[fd.index()].as_ref().ok_or(FdError::NotOpen)
    }

    /// Look up an open file for modification.
    pub fn lookup_mut(&mut self, fd: Fd) -> Result<&mut OpenFile<H>, FdError> {
        self.check(fd)?;
        self.slots[fd.index()].as_mut().ok_or(FdError::NotOpen)
    }

    /// Remove a file from the table.
    ///
    /// Returns the removed file, or an error if the slot is empty.
    pub fn remove(&mut self, fd: Fd) -> Result<OpenFile<H>, FdError> {
        self.check(fd)?;
        let file = self.slots[fd.index()].take().ok_or(FdError::NotOpen)?;
        self.occupied &= !fd.bit();
        Ok(file)
    }

    /// Empty the table, returning every handle that was still open.
    pub fn drain(&mut self) -> Vec<H> {
        let mut handles = Vec::with_capacity(self.len());
        while self.occupied != 0 {
            let fd = Fd(self.occupied.trailing_zeros());
            self.occupied &= !fd.bit();
            if let Some(file) = self.slots[fd.index()].take() {
                handles.push(file.into_handle());
            }
        }
        handles
    }

    fn check(&self, fd: Fd) -> Result<(), FdError> {
        if fd.is_console() {
            return Err(FdError::InvalidDescriptor);
        }
        if self.occupied & fd.bit() == 0 {
            return Err(FdError::NotOpen);
        }
        Ok(())
    }
}

impl<H> Default for FdTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> core::fmt::Debug for FdTable<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FdTable(open={}, bitmap={:#x})", self.len(), self.occupied)
    }
}
