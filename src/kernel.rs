//! Kernel Context
//!
//! The state shared by every process's kernel thread: the filesystem behind
//! its lock, the console, the process-control collaborator and the process
//! registry. A `Kernel` is reached by `&` from all threads at once; each
//! thread brings its own `&mut Process`.

use core::fmt::Write;

use log::{info, warn};

use crate::drivers::console::{Console, ConsoleWriter};
use crate::fs::{FileSystem, FsLock};
use crate::process::{Process, ProcessControl, ProcessRegistry};

/// Shared kernel state seen by the syscall layer.
pub struct Kernel<F: FileSystem, C, P> {
    fs: FsLock<F>,
    console: C,
    procs: P,
    registry: ProcessRegistry,
}

impl<F, C, P> Kernel<F, C, P>
where
    F: FileSystem,
    C: Console,
    P: ProcessControl<F>,
{
    /// Assemble the kernel from its collaborators.
    pub fn new(fs: F, console: C, procs: P) -> Self {
        Self {
            fs: FsLock::new(fs),
            console,
            procs,
            registry: ProcessRegistry::new(),
        }
    }

    /// The filesystem lock.
    #[inline]
    pub fn fs(&self) -> &FsLock<F> {
        &self.fs
    }

    /// The console.
    #[inline]
    pub fn console(&self) -> &C {
        &self.console
    }

    /// The process-control collaborator.
    #[inline]
    pub fn procs(&self) -> &P {
        &self.procs
    }

    /// The process registry.
    #[inline]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Tear down `proc` with `status`.
    ///
    /// Shared by `exit` and by termination after a fault:
    /// 1. Print `<name>: exit(<status>)` on the console
    /// 2. Close every open descriptor under the filesystem lock
    /// 3. Publish the status to the parent and orphan the children
    ///
    /// Runs at most once per process; later calls are ignored.
    pub fn terminate<A>(&self, proc: &mut Process<A, F::File>, status: i32) {
        if !proc.mark_exited(status) {
            return;
        }

        let _ = writeln!(ConsoleWriter::new(&self.console), "{}: exit({})", proc.name(), status);
        info!(
            "[PROCESS] {} (pid {}) exited with status {}",
            proc.name(),
            proc.pid(),
            status
        );

        let handles = proc.files_mut().drain();
        if !handles.is_empty() {
            self.fs.close_all(handles);
        }

        if let Some(slot) = proc.slot() {
            if let Err(e) = self.registry.exit(slot, status) {
                warn!("[PROCESS] pid {}: exit not reported: {}", proc.pid(), e);
            }
        }
        self.registry.orphan_children(proc.pid());
    }
}

impl<F: FileSystem, C, P> core::fmt::Debug for Kernel<F, C, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("fs", &self.fs)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
