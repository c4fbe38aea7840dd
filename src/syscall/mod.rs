//! System Call Interface
//!
//! The Pintos user-program syscall set, entered through `int 0x30`.
//!
//! # Security Model
//! - Whitelist approach: only the thirteen numbered syscalls are accepted
//! - Every user pointer is validated before it is dereferenced
//! - Invalid pointers terminate the caller; invalid values fail recoverably
//!
//! # Syscalls
//! | nr | call                       | returns                |
//! |----|----------------------------|------------------------|
//! | 0  | halt()                     | does not return        |
//! | 1  | exit(status)               | does not return        |
//! | 2  | exec(cmdline)              | pid, or -1             |
//! | 3  | wait(pid)                  | child's status, or -1  |
//! | 4  | create(name, size)         | bool                   |
//! | 5  | remove(name)               | bool                   |
//! | 6  | open(name)                 | fd, or -1              |
//! | 7  | filesize(fd)               | bytes, or -1           |
//! | 8  | read(fd, buf, len)         | bytes read, or -1      |
//! | 9  | write(fd, buf, len)        | bytes written, or -1   |
//! | 10 | seek(fd, pos)              | nothing                |
//! | 11 | tell(fd)                   | offset, or -1          |
//! | 12 | close(fd)                  | nothing                |

mod args;
mod file;
pub mod handler;
mod process;
pub mod validate;

pub use args::{SyscallArgs, MAX_ARGS};
pub use handler::{
    numbers, Reply, Syscall, SyscallError, SyscallRequest, SyscallResult, FAULT_EXIT_STATUS,
};
pub use validate::{check_user_range, read_user_str, read_word, Access, Fault, UserRange};
