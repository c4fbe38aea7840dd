//! User Processes
//!
//! A [`Process`] is the per-thread state the syscall layer works on: its
//! address space, its descriptor table and its place in the
//! [`ProcessRegistry`]. It is owned by the process's kernel thread and is
//! passed to the Dispatcher by `&mut`, so none of it needs locking.
//!
//! Creating threads and loading executables is the job of the
//! [`ProcessControl`] collaborator.

pub mod registry;

use alloc::string::{String, ToString};

use crate::fd::FdTable;
use crate::fs::FileSystem;

pub use registry::{ExitSignal, ProcessRegistry, RegistryError, SlotId, REGISTRY_SIZE};

/// A process id as seen by user code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    /// Returned to user code when `exec` fails. Never a real pid.
    pub const ERROR: i32 = -1;

    /// Wrap a raw id.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw id.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a child could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The executable does not exist.
    NotFound,
    /// The executable exists but could not be loaded.
    BadExecutable,
    /// No thread or memory for the child.
    OutOfResources,
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "executable not found"),
            Self::BadExecutable => write!(f, "executable could not be loaded"),
            Self::OutOfResources => write!(f, "out of resources"),
        }
    }
}

/// Thread creation and loading, provided by the scheduler and loader.
pub trait ProcessControl<F: FileSystem> {
    /// Start a process running `cmdline`.
    ///
    /// Called with the filesystem lock held; `fs` is the locked filesystem
    /// the loader reads the executable from. Must not return until loading
    /// has finished, so the result tells success from failure. The child's
    /// [`Process`] is created with [`Process::child`] and `slot`.
    fn spawn(&self, fs: &mut F, cmdline: &str, slot: SlotId) -> Result<Pid, LoadError>;

    /// Give up the CPU so other threads can run.
    ///
    /// Called by `wait` between checks of the child's exit signal.
    fn yield_now(&self);

    /// Terminate the calling thread and free its kernel resources.
    fn exit_thread(&self) -> !;

    /// Power the machine off.
    fn power_off(&self) -> !;
}

/// The program name of a command line: its first whitespace-separated word.
pub fn process_name(cmdline: &str) -> &str {
    cmdline.split_whitespace().next().unwrap_or("")
}

/// Per-process state owned by the process's kernel thread.
#[derive(Debug)]
pub struct Process<A, H> {
    pid: Pid,
    name: String,
    slot: Option<SlotId>,
    space: A,
    files: FdTable<H>,
    exit_status: Option<i32>,
}

impl<A, H> Process<A, H> {
    /// The first process, which has no parent to report to.
    pub fn new(pid: Pid, name: &str, space: A) -> Self {
        Self {
            pid,
            name: name.to_string(),
            slot: None,
            space,
            files: FdTable::new(),
            exit_status: None,
        }
    }

    /// A process started by `exec`, reporting its exit through `slot`.
    pub fn child(pid: Pid, name: &str, slot: SlotId, space: A) -> Self {
        Self {
            slot: Some(slot),
            ..Self::new(pid, name, space)
        }
    }

    /// Process id.
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Program name, as printed in the exit message.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry slot, if started by `exec`.
    #[inline]
    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    /// The address space.
    #[inline]
    pub fn space(&self) -> &A {
        &self.space
    }

    /// The address space, mutably.
    #[inline]
    pub fn space_mut(&mut self) -> &mut A {
        &mut self.space
    }

    /// The descriptor table.
    #[inline]
    pub fn files(&self) -> &FdTable<H> {
        &self.files
    }

    /// The descriptor table, mutably.
    #[inline]
    pub fn files_mut(&mut self) -> &mut FdTable<H> {
        &mut self.files
    }

    /// Address space and descriptor table at once, for transfers that copy
    /// between a file and user memory.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut A, &mut FdTable<H>) {
        (&mut self.space, &mut self.files)
    }

    /// Exit status, once the process has been torn down.
    #[inline]
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Record the exit status. Returns false if one was already recorded.
    pub(crate) fn mark_exited(&mut self, status: i32) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        self.exit_status = Some(status);
        true
    }
}
