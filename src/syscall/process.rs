//! Process Syscalls
//!
//! `halt`, `exit`, `exec` and `wait`.

use log::{debug, info, warn};

use crate::fs::{FileSystem, FsLock};
use crate::mm::{AddressSpace, VirtAddr, PAGE_SIZE};
use crate::process::{Pid, Process, ProcessControl, ProcessRegistry};

use super::handler::{Reply, SyscallResult};
use super::validate;

/// halt(): power the machine off.
pub fn halt<A, H>(proc: &Process<A, H>) -> SyscallResult {
    info!("[SYSCALL] halt from pid {} ({})", proc.pid(), proc.name());
    Ok(Reply::Halt)
}

/// exit(status): terminate the caller, reporting `status` to its parent.
pub fn exit(status: i32) -> SyscallResult {
    Ok(Reply::Exit(status))
}

/// exec(cmdline): start a child and return its pid.
///
/// Does not return until the child has finished loading. A registry entry
/// is reserved before the loader runs and dropped again if loading fails,
/// so a failed exec leaves nothing behind.
pub fn exec<F, P, A>(
    fs: &FsLock<F>,
    procs: &P,
    registry: &ProcessRegistry,
    proc: &Process<A, F::File>,
    cmdline: VirtAddr,
) -> SyscallResult
where
    F: FileSystem,
    P: ProcessControl<F>,
    A: AddressSpace,
{
    let cmdline = validate::read_user_str(proc.space(), cmdline, PAGE_SIZE)?;
    let slot = registry.reserve(proc.pid())?;

    match fs.with(|fs| procs.spawn(fs, &cmdline, slot)) {
        Ok(pid) => {
            registry.bind(slot, pid)?;
            debug!("[PROCESS] pid {} started {:?} as pid {}", proc.pid(), cmdline, pid);
            Ok(Reply::int(pid.as_raw()))
        }
        Err(e) => {
            if let Err(stale) = registry.cancel(slot) {
                warn!("[PROCESS] pid {}: {}", proc.pid(), stale);
            }
            Err(e.into())
        }
    }
}

/// wait(pid): block until child `pid` exits and return its status.
///
/// `yield_now` hands the CPU to the scheduler until the child has exited.
/// Each child can be waited for once.
pub fn wait<A, H>(
    registry: &ProcessRegistry,
    proc: &Process<A, H>,
    pid: i32,
    yield_now: impl FnMut(),
) -> SyscallResult {
    let status = registry.wait(proc.pid(), Pid::new(pid), yield_now)?;
    Ok(Reply::int(status))
}
