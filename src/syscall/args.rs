//! Syscall Argument Marshaling
//!
//! User code pushes the syscall number and then up to three argument words
//! before trapping:
//!
//! ```text
//! esp + 12 ┌────────────┐
//!          │   arg 2    │
//! esp + 8  ├────────────┤
//!          │   arg 1    │
//! esp + 4  ├────────────┤
//!          │   arg 0    │
//! esp      ├────────────┤
//!          │  number    │
//!          └────────────┘
//! ```
//!
//! Words are returned raw. Each handler decides whether a word is an
//! integer, a size or a pointer, and validates pointed-to memory itself.

use crate::mm::{AddressSpace, VirtAddr, WORD_SIZE};

use super::validate::{self, Fault};

/// Largest arity of any syscall.
pub const MAX_ARGS: usize = 3;

/// Raw argument words of one syscall, in push order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyscallArgs {
    words: [u32; MAX_ARGS],
    count: usize,
}

impl SyscallArgs {
    /// Read `arity` words that follow the syscall number at `esp`.
    ///
    /// Every word's full address range is validated before it is read. The
    /// first bad word aborts the fetch; no partial argument list is returned.
    pub fn fetch<A: AddressSpace>(
        space: &A,
        esp: VirtAddr,
        arity: usize,
    ) -> Result<Self, Fault> {
        debug_assert!(arity <= MAX_ARGS);

        let mut args = Self::default();
        let mut cursor = esp;
        for slot in args.words.iter_mut().take(arity) {
            cursor = cursor
                .checked_add(WORD_SIZE)
                .ok_or(Fault::BadAddress(cursor))?;
            *slot = validate::read_word(space, cursor)?;
        }
        args.count = arity.min(MAX_ARGS);
        Ok(args)
    }

    /// Number of words fetched.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check for a zero-argument syscall.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The fetched words.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.count]
    }

    /// Argument `i` as a raw word.
    #[inline]
    pub fn word(&self, i: usize) -> u32 {
        self.as_slice()[i]
    }

    /// Argument `i` as a signed integer.
    #[inline]
    pub fn int(&self, i: usize) -> i32 {
        self.word(i) as i32
    }

    /// Argument `i` as a user address.
    #[inline]
    pub fn addr(&self, i: usize) -> VirtAddr {
        VirtAddr::new(self.word(i))
    }
}
