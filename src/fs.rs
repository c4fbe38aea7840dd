//! Filesystem Seam and Filesystem Lock
//!
//! The filesystem is an external collaborator that is not safe under
//! concurrent entry. All access from the syscall layer goes through one
//! [`FsLock`], which handlers receive by reference; there is no hidden
//! global.
//!
//! # Ordering
//! At most one process executes inside [`FileSystem`] at a time. That covers
//! metadata changes (`create`, `remove`, `open`) as well as reads, writes and
//! length queries through open handles.

use spin::Mutex;

/// Operations the syscall layer needs from the filesystem.
pub trait FileSystem {
    /// An open file.
    type File;

    /// Create a file of `initial_size` zero bytes. False if it exists or
    /// cannot be created.
    fn create(&mut self, name: &str, initial_size: u32) -> bool;

    /// Delete a file by name. Open handles stay usable.
    fn remove(&mut self, name: &str) -> bool;

    /// Open a file by name.
    fn open(&mut self, name: &str) -> Option<Self::File>;

    /// Length of the file in bytes.
    fn length(&mut self, file: &Self::File) -> u32;

    /// Read up to `buf.len()` bytes at `offset`, returning the count read.
    fn read_at(&mut self, file: &mut Self::File, buf: &mut [u8], offset: u32) -> usize;

    /// Write `buf` at `offset`, returning the count written.
    fn write_at(&mut self, file: &mut Self::File, buf: &[u8], offset: u32) -> usize;

    /// Close a handle.
    fn close(&mut self, file: Self::File);
}

/// The lock serializing every call into the filesystem.
pub struct FsLock<F> {
    inner: Mutex<F>,
}

impl<F: FileSystem> FsLock<F> {
    /// Take ownership of the filesystem.
    pub const fn new(fs: F) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    /// Run `f` with exclusive access to the filesystem.
    ///
    /// Blocks while another process is inside.
    pub fn with<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        let mut fs = self.inner.lock();
        f(&mut fs)
    }

    /// Close a batch of handles in one critical section.
    pub fn close_all(&self, handles: impl IntoIterator<Item = F::File>) {
        self.with(|fs| {
            for handle in handles {
                fs.close(handle);
            }
        });
    }
}

impl<F> core::fmt::Debug for FsLock<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FsLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}
