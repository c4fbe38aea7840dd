//! System Call Dispatcher
//!
//! Decodes a trap into a [`SyscallRequest`] and routes it to its handler.
//!
//! # States
//! 1. decode: validate the word at `esp`, read the syscall number
//! 2. validate-args: fetch the operation's arity worth of words
//! 3. execute: run the handler
//! 4. return-or-terminate: write `eax`, or tear the process down
//!
//! # Security Considerations
//! - Unknown syscall numbers are a protocol violation and kill the process
//! - Faults are enforced here, uniformly, never by individual handlers
//! - Recoverable errors become the operation's failure value

use log::{debug, trace, warn};

use crate::drivers::console::Console;
use crate::fd::FdError;
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, VirtAddr};
use crate::process::{LoadError, Process, ProcessControl, RegistryError};
use crate::trap::{TrapExit, TrapFrame};

use super::args::SyscallArgs;
use super::validate::{self, Fault};
use super::{file, process};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
}

/// Exit status of a process killed for a protocol violation.
pub const FAULT_EXIT_STATUS: i32 = -1;

/// Failure value of syscalls that return an integer.
const FAILURE: u32 = -1i32 as u32;

/// System call error
///
/// Everything except `Fault` is recoverable and reported to user code as the
/// operation's failure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Protocol violation; the process is terminated.
    Fault(Fault),
    /// Descriptor not open, reserved, or not usable for this operation.
    BadDescriptor,
    /// `wait` on a pid that is not a waitable child.
    NotChild,
    /// `open` of a file that does not exist.
    NoSuchFile,
    /// The filesystem refused to create the file.
    CreateFailed,
    /// The filesystem refused to remove the file.
    RemoveFailed,
    /// The child of `exec` could not be loaded.
    LoadFailed(LoadError),
    /// No free descriptor.
    TableFull,
    /// No free registry entry.
    RegistryFull,
    /// Name or command line longer than a page.
    NameTooLong,
    /// Name is not valid UTF-8.
    BadName,
}

impl SyscallError {
    /// Check whether the error kills the process.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

impl core::fmt::Display for SyscallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fault(fault) => write!(f, "fault: {}", fault),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::NotChild => write!(f, "no such child"),
            Self::NoSuchFile => write!(f, "no such file"),
            Self::CreateFailed => write!(f, "create failed"),
            Self::RemoveFailed => write!(f, "remove failed"),
            Self::LoadFailed(e) => write!(f, "load failed: {}", e),
            Self::TableFull => write!(f, "descriptor table full"),
            Self::RegistryFull => write!(f, "process registry full"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::BadName => write!(f, "name is not valid UTF-8"),
        }
    }
}

impl From<Fault> for SyscallError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl From<FdError> for SyscallError {
    fn from(e: FdError) -> Self {
        match e {
            FdError::TableFull => Self::TableFull,
            FdError::InvalidDescriptor | FdError::NotOpen | FdError::InsufficientRights => {
                Self::BadDescriptor
            }
        }
    }
}

impl From<RegistryError> for SyscallError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Full => Self::RegistryFull,
            RegistryError::NotChild | RegistryError::StaleSlot => Self::NotChild,
        }
    }
}

impl From<LoadError> for SyscallError {
    fn from(e: LoadError) -> Self {
        Self::LoadFailed(e)
    }
}

/// What a handler asks the Dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Store the value in `eax` and resume.
    Value(u32),
    /// Resume without touching `eax`.
    Void,
    /// Terminate the caller with this status.
    Exit(i32),
    /// Stop the machine.
    Halt,
}

impl Reply {
    /// A boolean result.
    #[inline]
    pub const fn bool(value: bool) -> Self {
        Self::Value(value as u32)
    }

    /// A signed integer result.
    #[inline]
    pub const fn int(value: i32) -> Self {
        Self::Value(value as u32)
    }
}

/// Result type of syscall handlers.
pub type SyscallResult = Result<Reply, SyscallError>;

/// The operations behind the syscall numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    Halt = numbers::SYS_HALT,
    Exit = numbers::SYS_EXIT,
    Exec = numbers::SYS_EXEC,
    Wait = numbers::SYS_WAIT,
    Create = numbers::SYS_CREATE,
    Remove = numbers::SYS_REMOVE,
    Open = numbers::SYS_OPEN,
    Filesize = numbers::SYS_FILESIZE,
    Read = numbers::SYS_READ,
    Write = numbers::SYS_WRITE,
    Seek = numbers::SYS_SEEK,
    Tell = numbers::SYS_TELL,
    Close = numbers::SYS_CLOSE,
}

impl Syscall {
    /// Number of argument words on the user stack.
    pub const fn arity(self) -> usize {
        match self {
            Self::Halt => 0,
            Self::Exit
            | Self::Exec
            | Self::Wait
            | Self::Remove
            | Self::Open
            | Self::Filesize
            | Self::Tell
            | Self::Close => 1,
            Self::Create | Self::Seek => 2,
            Self::Read | Self::Write => 3,
        }
    }

    /// What user code sees when the operation fails recoverably.
    pub const fn failure_reply(self) -> Reply {
        match self {
            Self::Create | Self::Remove => Reply::bool(false),
            Self::Seek | Self::Close | Self::Halt => Reply::Void,
            Self::Exit => Reply::Exit(FAULT_EXIT_STATUS),
            Self::Exec
            | Self::Wait
            | Self::Open
            | Self::Filesize
            | Self::Read
            | Self::Write
            | Self::Tell => Reply::Value(FAILURE),
        }
    }

    /// Name for log messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Exit => "exit",
            Self::Exec => "exec",
            Self::Wait => "wait",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Open => "open",
            Self::Filesize => "filesize",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Tell => "tell",
            Self::Close => "close",
        }
    }
}

impl TryFrom<u32> for Syscall {
    type Error = Fault;

    fn try_from(nr: u32) -> Result<Self, Fault> {
        use numbers::*;
        Ok(match nr {
            SYS_HALT => Self::Halt,
            SYS_EXIT => Self::Exit,
            SYS_EXEC => Self::Exec,
            SYS_WAIT => Self::Wait,
            SYS_CREATE => Self::Create,
            SYS_REMOVE => Self::Remove,
            SYS_OPEN => Self::Open,
            SYS_FILESIZE => Self::Filesize,
            SYS_READ => Self::Read,
            SYS_WRITE => Self::Write,
            SYS_SEEK => Self::Seek,
            SYS_TELL => Self::Tell,
            SYS_CLOSE => Self::Close,
            _ => return Err(Fault::UnknownSyscall(nr)),
        })
    }
}

/// A decoded trap: the operation and its raw argument words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRequest {
    pub call: Syscall,
    pub args: SyscallArgs,
}

impl SyscallRequest {
    /// Decode the request sitting on the user stack at `esp`.
    pub fn decode<A: AddressSpace>(space: &A, esp: VirtAddr) -> Result<Self, Fault> {
        let nr = validate::read_word(space, esp)?;
        let call = Syscall::try_from(nr)?;
        let args = SyscallArgs::fetch(space, esp, call.arity())?;
        Ok(Self { call, args })
    }
}

impl<F, C, P> Kernel<F, C, P>
where
    F: FileSystem,
    C: Console,
    P: ProcessControl<F>,
{
    /// Handle one syscall trap from `proc`.
    ///
    /// # Returns
    /// - `Resume`: `frame` is ready to return to user mode
    /// - `Terminate`: the process has been torn down; do not resume it
    /// - `Halt`: power off
    pub fn dispatch<A: AddressSpace>(
        &self,
        proc: &mut Process<A, F::File>,
        frame: &mut TrapFrame,
    ) -> TrapExit {
        let reply = match SyscallRequest::decode(proc.space(), VirtAddr::new(frame.esp)) {
            Ok(request) => self.execute(proc, request),
            Err(fault) => Err(fault),
        };

        match reply {
            Ok(Reply::Value(value)) => {
                frame.eax = value;
                TrapExit::Resume
            }
            Ok(Reply::Void) => TrapExit::Resume,
            Ok(Reply::Exit(status)) => {
                self.terminate(proc, status);
                TrapExit::Terminate(status)
            }
            Ok(Reply::Halt) => TrapExit::Halt,
            Err(fault) => {
                warn!("[SYSCALL] pid {} ({}): {}", proc.pid(), proc.name(), fault);
                self.terminate(proc, FAULT_EXIT_STATUS);
                TrapExit::Terminate(FAULT_EXIT_STATUS)
            }
        }
    }

    /// Run a decoded request. Only faults escape as errors.
    fn execute<A: AddressSpace>(
        &self,
        proc: &mut Process<A, F::File>,
        request: SyscallRequest,
    ) -> Result<Reply, Fault> {
        let SyscallRequest { call, args } = request;
        trace!("[SYSCALL] pid {}: {}{:?}", proc.pid(), call.name(), args.as_slice());

        let result = match call {
            Syscall::Halt => process::halt(proc),
            Syscall::Exit => process::exit(args.int(0)),
            Syscall::Exec => process::exec(self.fs(), self.procs(), self.registry(), proc, args.addr(0)),
            Syscall::Wait => process::wait(self.registry(), proc, args.int(0), || {
                self.procs().yield_now()
            }),
            Syscall::Create => file::create(self.fs(), proc, args.addr(0), args.word(1)),
            Syscall::Remove => file::remove(self.fs(), proc, args.addr(0)),
            Syscall::Open => file::open(self.fs(), proc, args.addr(0)),
            Syscall::Filesize => file::filesize(self.fs(), proc, args.int(0)),
            Syscall::Read => file::read(
                self.fs(),
                self.console(),
                proc,
                args.int(0),
                args.addr(1),
                args.word(2),
            ),
            Syscall::Write => file::write(
                self.fs(),
                self.console(),
                proc,
                args.int(0),
                args.addr(1),
                args.word(2),
            ),
            Syscall::Seek => file::seek(proc, args.int(0), args.word(1)),
            Syscall::Tell => file::tell(proc, args.int(0)),
            Syscall::Close => file::close(self.fs(), proc, args.int(0)),
        };

        match result {
            Ok(reply) => Ok(reply),
            Err(SyscallError::Fault(fault)) => Err(fault),
            Err(e) => {
                debug!("[SYSCALL] pid {}: {} failed: {}", proc.pid(), call.name(), e);
                Ok(call.failure_reply())
            }
        }
    }
}
