//! System Call Input Validation
//!
//! Every address a user process hands to the kernel passes through here
//! before a single byte behind it is read or written.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Prevent common vulnerabilities:
//!   - Buffer overflows (the whole range is checked, not just its first byte)
//!   - Kernel memory disclosure (ranges must end at or below `PHYS_BASE`)
//!   - TOCTOU races (data is copied into kernel buffers)
//!   - Null pointer dereference (explicit checks)

use alloc::string::String;
use alloc::vec::Vec;

use crate::mm::{AddressSpace, PageFlags, VirtAddr, PAGE_SIZE, PHYS_BASE, WORD_SIZE};

use super::handler::SyscallError;

/// A protocol violation by the calling process.
///
/// Always fatal: the Dispatcher terminates the process with status -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Null, kernel, unmapped or read-only (for writes) user address.
    BadAddress(VirtAddr),
    /// No handler for this syscall number.
    UnknownSyscall(u32),
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadAddress(addr) => write!(f, "bad user address {}", addr),
            Self::UnknownSyscall(nr) => write!(f, "unknown syscall {}", nr),
        }
    }
}

/// How the kernel is going to touch a user range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Kernel reads user memory (write(2) buffers, names, arguments).
    Read,
    /// Kernel writes user memory (read(2) buffers).
    Write,
}

/// A validated user-space range.
///
/// This type guarantees that:
/// - The range does not start at null
/// - The range lies entirely below `PHYS_BASE`
/// - Every page it spans was mapped with the requested access when checked
///
/// Only [`check_user_range`] constructs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRange {
    start: VirtAddr,
    len: usize,
}

impl UserRange {
    /// Start of the range.
    #[inline]
    pub fn start(&self) -> VirtAddr {
        self.start
    }

    /// Length of the range in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check for a zero-length range.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `buf.len()` bytes at `offset` into the range out of user memory.
    pub fn copy_in<A: AddressSpace>(
        &self,
        space: &A,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Fault> {
        let mut addr = self.sub_start(offset, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let page_off = addr.page_offset();
            let chunk = (buf.len() - done).min(PAGE_SIZE - page_off);
            let frame = space.frame(addr).ok_or(Fault::BadAddress(addr))?;
            buf[done..done + chunk].copy_from_slice(&frame[page_off..page_off + chunk]);
            done += chunk;
            if done < buf.len() {
                addr = addr.checked_add(chunk).ok_or(Fault::BadAddress(addr))?;
            }
        }
        Ok(())
    }

    /// Copy `data` into user memory at `offset` into the range.
    pub fn copy_out<A: AddressSpace>(
        &self,
        space: &mut A,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Fault> {
        let mut addr = self.sub_start(offset, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let page_off = addr.page_offset();
            let chunk = (data.len() - done).min(PAGE_SIZE - page_off);
            let frame = space.frame_mut(addr).ok_or(Fault::BadAddress(addr))?;
            frame[page_off..page_off + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
            if done < data.len() {
                addr = addr.checked_add(chunk).ok_or(Fault::BadAddress(addr))?;
            }
        }
        Ok(())
    }

    /// Start address of the sub-range `[offset, offset + len)`.
    fn sub_start(&self, offset: usize, len: usize) -> Result<VirtAddr, Fault> {
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > self.len) {
            return Err(Fault::BadAddress(self.start));
        }
        self.start
            .checked_add(offset)
            .ok_or(Fault::BadAddress(self.start))
    }
}

/// Validate a user-space range.
///
/// # Arguments
/// * `space` - Address space of the calling process
/// * `addr` - User-supplied start address
/// * `len` - Range length in bytes
/// * `access` - Whether the kernel will read or write the range
///
/// # Security Checks
/// 1. Start is not null
/// 2. Start + length doesn't overflow
/// 3. End is at or below `PHYS_BASE`
/// 4. Every page in the range is mapped for user access
/// 5. For `Access::Write`, every page is writable
///
/// A zero-length range still must not start at null or in kernel space, but
/// no page needs to be mapped since nothing will be dereferenced.
pub fn check_user_range<A: AddressSpace>(
    space: &A,
    addr: VirtAddr,
    len: usize,
    access: Access,
) -> Result<UserRange, Fault> {
    if addr.is_null() || !addr.is_user() {
        return Err(Fault::BadAddress(addr));
    }

    let end = addr
        .checked_add(len)
        .filter(|end| end.as_u32() <= PHYS_BASE)
        .ok_or(Fault::BadAddress(addr))?;

    if len == 0 {
        return Ok(UserRange { start: addr, len: 0 });
    }

    let required = match access {
        Access::Read => PageFlags::PRESENT | PageFlags::USER,
        Access::Write => PageFlags::PRESENT | PageFlags::USER | PageFlags::WRITABLE,
    };

    // One check per page; `end` is exclusive.
    let last_page = VirtAddr::new(end.as_u32() - 1).page_down();
    let mut page = addr.page_down();
    loop {
        let probe = if page < addr { addr } else { page };
        match space.page_flags(probe) {
            Some(flags) if flags.contains(required) => {}
            _ => return Err(Fault::BadAddress(probe)),
        }
        if page == last_page {
            break;
        }
        page = page
            .checked_add(PAGE_SIZE)
            .ok_or(Fault::BadAddress(page))?;
    }

    Ok(UserRange { start: addr, len })
}

/// Read one machine word from user memory after validating all of its bytes.
pub fn read_word<A: AddressSpace>(space: &A, addr: VirtAddr) -> Result<u32, Fault> {
    let range = check_user_range(space, addr, WORD_SIZE, Access::Read)?;
    let mut bytes = [0u8; WORD_SIZE];
    range.copy_in(space, 0, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Copy a NUL-terminated string out of user memory.
///
/// Each page is validated the first time the scan enters it; running into
/// an unmapped page or the kernel boundary before the terminator is a fault.
/// A string with no terminator within `max_len` bytes is rejected as
/// `NameTooLong` without killing the process.
pub fn read_user_str<A: AddressSpace>(
    space: &A,
    addr: VirtAddr,
    max_len: usize,
) -> Result<String, SyscallError> {
    if addr.is_null() || !addr.is_user() {
        return Err(Fault::BadAddress(addr).into());
    }

    let mut bytes = Vec::new();
    let mut cursor = addr;
    loop {
        if !cursor.is_user() || !space.is_mapped(cursor) {
            return Err(Fault::BadAddress(cursor).into());
        }
        let frame = space.frame(cursor).ok_or(Fault::BadAddress(cursor))?;
        let tail = &frame[cursor.page_offset()..];

        if let Some(nul) = tail.iter().position(|&b| b == 0) {
            if bytes.len() + nul > max_len {
                return Err(SyscallError::NameTooLong);
            }
            bytes.extend_from_slice(&tail[..nul]);
            break;
        }

        bytes.extend_from_slice(tail);
        if bytes.len() > max_len {
            return Err(SyscallError::NameTooLong);
        }
        cursor = cursor
            .checked_add(tail.len())
            .ok_or(Fault::BadAddress(cursor))?;
    }

    String::from_utf8(bytes).map_err(|_| SyscallError::BadName)
}
