//! User Virtual Addresses
//!
//! Type-safe wrapper for addresses supplied by user code.
//!
//! # Memory Map (32-bit)
//! ```text
//! 0xFFFF_FFFF ┌──────────────────────┐
//!             │  kernel (direct map) │
//! 0xC000_0000 ├──────────────────────┤ PHYS_BASE
//!             │  user stack          │
//!             │         ...          │
//!             │  user code / data    │
//! 0x0000_0000 └──────────────────────┘
//! ```
//!
//! # Security Properties
//! - A `VirtAddr` is never dereferenced directly; user memory is reached only
//!   through an [`AddressSpace`](super::AddressSpace) after validation
//! - Arithmetic is checked so a range can never wrap past the boundary

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: u32 = PAGE_SIZE as u32 - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: u32 = 12;

/// Boundary between user and kernel space. Every user byte lies below it.
pub const PHYS_BASE: u32 = 0xC000_0000;

/// Size of a machine word on the user stack.
pub const WORD_SIZE: usize = 4;

/// A virtual address in the calling process's address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Wrap a raw address word.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if this is a user address (below `PHYS_BASE`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < PHYS_BASE
    }

    /// Check if this is a kernel address.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        !self.is_user()
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page number.
    #[inline]
    pub const fn page_number(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        (self.0 & PAGE_MASK) as usize
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub fn checked_add(self, offset: usize) -> Option<Self> {
        let offset = u32::try_from(offset).ok()?;
        self.0.checked_add(offset).map(Self)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
