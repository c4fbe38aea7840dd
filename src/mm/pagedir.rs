//! Per-Process Page Directory
//!
//! The syscall layer only needs two answers from the paging code: is this
//! user page present (and with which permissions), and where can the kernel
//! see its bytes. [`AddressSpace`] is that seam.
//!
//! [`PageDirectory`] is a software implementation of it. Hosted builds and
//! the loader glue use it to build user images; the tests use it to lay out
//! user stacks and buffers.
//!
//! # Security Properties
//! - Kernel addresses can never be mapped into a user directory
//! - Pages are zero-filled when mapped
//! - User pages carry explicit `WRITABLE` permission

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use bitflags::bitflags;

use super::address::{VirtAddr, PAGE_SIZE};

/// Backing storage of one user page, as seen from the kernel.
pub type Frame = [u8; PAGE_SIZE];

bitflags! {
    /// Page table entry flags (x86 PTE layout, low bits).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PageFlags: u32 {
        /// Entry is present.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is accessible from ring 3.
        const USER = 1 << 2;

        /// User read-only data or code.
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        /// User stack and data.
        const USER_RW = Self::USER_RO.bits() | Self::WRITABLE.bits();
    }
}

/// Introspection of the active address space.
///
/// Implemented by the paging code. All methods take any address inside the
/// page of interest.
pub trait AddressSpace {
    /// Flags of the page containing `vaddr`, or `None` if unmapped.
    fn page_flags(&self, vaddr: VirtAddr) -> Option<PageFlags>;

    /// Kernel view of the page containing `vaddr`.
    fn frame(&self, vaddr: VirtAddr) -> Option<&Frame>;

    /// Mutable kernel view of the page containing `vaddr`.
    fn frame_mut(&mut self, vaddr: VirtAddr) -> Option<&mut Frame>;

    /// Check whether `vaddr` is mapped for user access.
    fn is_mapped(&self, vaddr: VirtAddr) -> bool {
        self.page_flags(vaddr)
            .is_some_and(|flags| flags.contains(PageFlags::PRESENT | PageFlags::USER))
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The address is not in user space.
    KernelAddress,
    /// The page is already mapped.
    AlreadyMapped,
    /// The page is not mapped.
    NotMapped,
    /// The write runs past the mapped region.
    OutOfBounds,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::KernelAddress => write!(f, "address is not in user space"),
            Self::AlreadyMapped => write!(f, "page already mapped"),
            Self::NotMapped => write!(f, "page not mapped"),
            Self::OutOfBounds => write!(f, "access runs past mapped pages"),
        }
    }
}

struct Page {
    flags: PageFlags,
    frame: Box<Frame>,
}

/// A user page directory keyed by page number.
#[derive(Default)]
pub struct PageDirectory {
    pages: BTreeMap<u32, Page>,
}

impl PageDirectory {
    /// Create an empty directory.
    pub const fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// Map a zeroed page at `vaddr` with the given flags.
    pub fn map(&mut self, vaddr: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        if vaddr.is_kernel() {
            return Err(MappingError::KernelAddress);
        }
        let vpn = vaddr.page_number();
        if self.pages.contains_key(&vpn) {
            return Err(MappingError::AlreadyMapped);
        }
        self.pages.insert(
            vpn,
            Page {
                flags: flags | PageFlags::PRESENT,
                frame: Box::new([0; PAGE_SIZE]),
            },
        );
        Ok(())
    }

    /// Remove the mapping for the page containing `vaddr`.
    pub fn unmap(&mut self, vaddr: VirtAddr) -> Result<(), MappingError> {
        self.pages
            .remove(&vaddr.page_number())
            .map(|_| ())
            .ok_or(MappingError::NotMapped)
    }

    /// Change the flags of a mapped page.
    pub fn protect(&mut self, vaddr: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        let page = self
            .pages
            .get_mut(&vaddr.page_number())
            .ok_or(MappingError::NotMapped)?;
        page.flags = flags | PageFlags::PRESENT;
        Ok(())
    }

    /// Number of mapped pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Copy `data` into mapped pages starting at `vaddr`, ignoring permissions.
    ///
    /// This is the loader's view of memory (setting up stacks and images),
    /// not a path for user-supplied addresses.
    pub fn poke(&mut self, vaddr: VirtAddr, data: &[u8]) -> Result<(), MappingError> {
        let mut addr = vaddr;
        let mut rest = data;
        while !rest.is_empty() {
            let offset = addr.page_offset();
            let chunk = rest.len().min(PAGE_SIZE - offset);
            let page = self
                .pages
                .get_mut(&addr.page_number())
                .ok_or(MappingError::OutOfBounds)?;
            page.frame[offset..offset + chunk].copy_from_slice(&rest[..chunk]);
            rest = &rest[chunk..];
            if rest.is_empty() {
                break;
            }
            addr = addr.checked_add(chunk).ok_or(MappingError::OutOfBounds)?;
        }
        Ok(())
    }

    /// Copy mapped bytes starting at `vaddr` into `buf`, ignoring permissions.
    pub fn peek(&self, vaddr: VirtAddr, buf: &mut [u8]) -> Result<(), MappingError> {
        let mut addr = vaddr;
        let mut done = 0;
        while done < buf.len() {
            let offset = addr.page_offset();
            let chunk = (buf.len() - done).min(PAGE_SIZE - offset);
            let page = self
                .pages
                .get(&addr.page_number())
                .ok_or(MappingError::OutOfBounds)?;
            buf[done..done + chunk].copy_from_slice(&page.frame[offset..offset + chunk]);
            done += chunk;
            if done == buf.len() {
                break;
            }
            addr = addr.checked_add(chunk).ok_or(MappingError::OutOfBounds)?;
        }
        Ok(())
    }
}

impl AddressSpace for PageDirectory {
    fn page_flags(&self, vaddr: VirtAddr) -> Option<PageFlags> {
        self.pages.get(&vaddr.page_number()).map(|page| page.flags)
    }

    fn frame(&self, vaddr: VirtAddr) -> Option<&Frame> {
        self.pages.get(&vaddr.page_number()).map(|page| &*page.frame)
    }

    fn frame_mut(&mut self, vaddr: VirtAddr) -> Option<&mut Frame> {
        self.pages
            .get_mut(&vaddr.page_number())
            .map(|page| &mut *page.frame)
    }
}

impl core::fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.pages.iter().map(|(vpn, page)| (vpn << 12, page.flags)))
            .finish()
    }
}
