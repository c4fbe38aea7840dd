//! File Syscalls
//!
//! Name-based calls (`create`, `remove`, `open`) and descriptor-based calls
//! (`filesize`, `read`, `write`, `seek`, `tell`, `close`).
//!
//! Every filesystem call runs under the [`FsLock`]. Transfers validate the
//! whole user buffer first, then move data in page-sized pieces through a
//! kernel bounce buffer, so the lock is never held while user memory is
//! being checked.

use alloc::vec;

use log::debug;

use crate::drivers::console::Console;
use crate::fd::{Fd, OpenFile, Rights};
use crate::fs::{FileSystem, FsLock};
use crate::mm::{AddressSpace, VirtAddr, PAGE_SIZE};
use crate::process::Process;

use super::handler::{Reply, SyscallError, SyscallResult};
use super::validate::{self, Access};

/// Longest file name accepted from user code, excluding the terminator.
const NAME_MAX: usize = PAGE_SIZE;

fn descriptor(raw: i32) -> Result<Fd, SyscallError> {
    Fd::from_raw(raw).ok_or(SyscallError::BadDescriptor)
}

/// create(name, initial_size)
pub fn create<F, A>(
    fs: &FsLock<F>,
    proc: &Process<A, F::File>,
    name: VirtAddr,
    initial_size: u32,
) -> SyscallResult
where
    F: FileSystem,
    A: AddressSpace,
{
    let name = validate::read_user_str(proc.space(), name, NAME_MAX)?;
    if fs.with(|fs| fs.create(&name, initial_size)) {
        Ok(Reply::bool(true))
    } else {
        Err(SyscallError::CreateFailed)
    }
}

/// remove(name)
pub fn remove<F, A>(fs: &FsLock<F>, proc: &Process<A, F::File>, name: VirtAddr) -> SyscallResult
where
    F: FileSystem,
    A: AddressSpace,
{
    let name = validate::read_user_str(proc.space(), name, NAME_MAX)?;
    if fs.with(|fs| fs.remove(&name)) {
        Ok(Reply::bool(true))
    } else {
        Err(SyscallError::RemoveFailed)
    }
}

/// open(name): install the file at the lowest free descriptor.
pub fn open<F, A>(fs: &FsLock<F>, proc: &mut Process<A, F::File>, name: VirtAddr) -> SyscallResult
where
    F: FileSystem,
    A: AddressSpace,
{
    let name = validate::read_user_str(proc.space(), name, NAME_MAX)?;
    let handle = fs
        .with(|fs| fs.open(&name))
        .ok_or(SyscallError::NoSuchFile)?;

    match proc.files_mut().insert(OpenFile::new(handle, Rights::READ_WRITE)) {
        Ok(fd) => {
            debug!("[FS] pid {} opened {:?} as fd {}", proc.pid(), name, fd.as_raw());
            Ok(Reply::Value(fd.as_raw()))
        }
        Err(rejected) => {
            fs.with(|fs| fs.close(rejected.into_handle()));
            Err(SyscallError::TableFull)
        }
    }
}

/// filesize(fd)
pub fn filesize<F, A>(fs: &FsLock<F>, proc: &Process<A, F::File>, fd: i32) -> SyscallResult
where
    F: FileSystem,
{
    let file = proc.files().lookup(descriptor(fd)?)?;
    Ok(Reply::Value(fs.with(|fs| fs.length(file.handle()))))
}

/// read(fd, buffer, length)
///
/// Descriptor 0 reads keyboard input until `length` bytes have arrived.
/// Files read from the descriptor's offset; a short count means end of file.
pub fn read<F, C, A>(
    fs: &FsLock<F>,
    console: &C,
    proc: &mut Process<A, F::File>,
    fd: i32,
    buffer: VirtAddr,
    length: u32,
) -> SyscallResult
where
    F: FileSystem,
    C: Console,
    A: AddressSpace,
{
    let length = length as usize;
    let range = validate::check_user_range(proc.space(), buffer, length, Access::Write)?;
    let fd = descriptor(fd)?;
    let mut bounce = vec![0u8; length.min(PAGE_SIZE)];

    if fd == Fd::STDIN {
        let mut done = 0;
        while done < length {
            let chunk = (length - done).min(PAGE_SIZE);
            for byte in &mut bounce[..chunk] {
                *byte = console.getc();
            }
            range.copy_out(proc.space_mut(), done, &bounce[..chunk])?;
            done += chunk;
        }
        return Ok(Reply::Value(done as u32));
    }
    if fd == Fd::STDOUT {
        return Err(SyscallError::BadDescriptor);
    }

    let (space, files) = proc.split_mut();
    let file = files.lookup_mut(fd)?;
    file.check_rights(Rights::READ)?;

    let mut done = 0;
    while done < length {
        let chunk = (length - done).min(PAGE_SIZE);
        let offset = file.offset();
        let got = fs
            .with(|fs| fs.read_at(file.handle_mut(), &mut bounce[..chunk], offset))
            .min(chunk);
        range.copy_out(space, done, &bounce[..got])?;
        file.advance(got);
        done += got;
        if got < chunk {
            break;
        }
    }
    Ok(Reply::Value(done as u32))
}

/// write(fd, buffer, length)
///
/// Descriptor 1 goes to the console in bounded chunks. Files are written at
/// the descriptor's offset; a short count means the file could not grow.
pub fn write<F, C, A>(
    fs: &FsLock<F>,
    console: &C,
    proc: &mut Process<A, F::File>,
    fd: i32,
    buffer: VirtAddr,
    length: u32,
) -> SyscallResult
where
    F: FileSystem,
    C: Console,
    A: AddressSpace,
{
    let length = length as usize;
    let range = validate::check_user_range(proc.space(), buffer, length, Access::Read)?;
    let fd = descriptor(fd)?;
    let mut bounce = vec![0u8; length.min(PAGE_SIZE)];

    if fd == Fd::STDOUT {
        let mut done = 0;
        while done < length {
            let chunk = (length - done).min(PAGE_SIZE);
            range.copy_in(proc.space(), done, &mut bounce[..chunk])?;
            console.put_chunked(&bounce[..chunk]);
            done += chunk;
        }
        return Ok(Reply::Value(done as u32));
    }
    if fd == Fd::STDIN {
        return Err(SyscallError::BadDescriptor);
    }

    let (space, files) = proc.split_mut();
    let file = files.lookup_mut(fd)?;
    file.check_rights(Rights::WRITE)?;

    let mut done = 0;
    while done < length {
        let chunk = (length - done).min(PAGE_SIZE);
        range.copy_in(&*space, done, &mut bounce[..chunk])?;
        let offset = file.offset();
        let put = fs
            .with(|fs| fs.write_at(file.handle_mut(), &bounce[..chunk], offset))
            .min(chunk);
        file.advance(put);
        done += put;
        if put < chunk {
            break;
        }
    }
    Ok(Reply::Value(done as u32))
}

/// seek(fd, position)
pub fn seek<A, H>(proc: &mut Process<A, H>, fd: i32, position: u32) -> SyscallResult {
    proc.files_mut().lookup_mut(descriptor(fd)?)?.seek(position);
    Ok(Reply::Void)
}

/// tell(fd)
pub fn tell<A, H>(proc: &Process<A, H>, fd: i32) -> SyscallResult {
    let file = proc.files().lookup(descriptor(fd)?)?;
    Ok(Reply::Value(file.offset()))
}

/// close(fd)
pub fn close<F, A>(fs: &FsLock<F>, proc: &mut Process<A, F::File>, fd: i32) -> SyscallResult
where
    F: FileSystem,
{
    let file = proc.files_mut().remove(descriptor(fd)?)?;
    fs.with(|fs| fs.close(file.into_handle()));
    Ok(Reply::Void)
}

#[cfg(test)]
mod tests {
    use crate::fd::FD_TABLE_SIZE;
    use crate::fs::FileSystem;
    use crate::mm::{VirtAddr, PAGE_SIZE};
    use crate::syscall::numbers::*;
    use crate::testutil::{
        boot, root_process, TestKernel, TestProcess, UserProgram, DATA_PAGE, EAX_POISON, RO_PAGE,
    };
    use crate::trap::TrapExit;

    const FAILED: u32 = u32::MAX;
    const NAME: u32 = DATA_PAGE;
    const BUF: u32 = DATA_PAGE + 0x100;

    fn open(kernel: &TestKernel, proc: &mut TestProcess, name: &str) -> u32 {
        proc.put_str(NAME, name);
        proc.syscall(kernel, SYS_OPEN, &[NAME]).1
    }

    #[test]
    fn test_create_open_write_seek_read() {
        let kernel = boot();
        let mut proc = root_process("rw");
        proc.put_str(NAME, "x");
        assert_eq!(proc.syscall(&kernel, SYS_CREATE, &[NAME, 0]).1, 1);

        let fd = open(&kernel, &mut proc, "x");
        assert!(fd >= 2);

        proc.put_bytes(BUF, b"ab");
        assert_eq!(proc.syscall(&kernel, SYS_WRITE, &[fd, BUF, 2]).1, 2);
        assert_eq!(proc.syscall(&kernel, SYS_TELL, &[fd]).1, 2);
        assert_eq!(proc.syscall(&kernel, SYS_FILESIZE, &[fd]).1, 2);

        assert_eq!(proc.syscall(&kernel, SYS_SEEK, &[fd, 0]).1, EAX_POISON);
        proc.put_bytes(BUF, b"\0\0");
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[fd, BUF, 2]).1, 2);
        assert_eq!(proc.peek_bytes(BUF, 2), b"ab");
    }

    #[test]
    fn test_create_existing_fails() {
        let kernel = boot();
        let mut proc = root_process("create");
        proc.put_str(NAME, "dup");
        assert_eq!(proc.syscall(&kernel, SYS_CREATE, &[NAME, 10]).1, 1);
        assert_eq!(proc.syscall(&kernel, SYS_CREATE, &[NAME, 10]).1, 0);
        proc.put_str(NAME, "");
        assert_eq!(proc.syscall(&kernel, SYS_CREATE, &[NAME, 0]).1, 0);
    }

    #[test]
    fn test_remove_keeps_open_handle() {
        let kernel = boot();
        let mut proc = root_process("remove");
        kernel.fs().with(|fs| fs.create("gone", 16));
        let fd = open(&kernel, &mut proc, "gone");

        proc.put_str(NAME, "gone");
        assert_eq!(proc.syscall(&kernel, SYS_REMOVE, &[NAME]).1, 1);
        assert_eq!(proc.syscall(&kernel, SYS_REMOVE, &[NAME]).1, 0);
        assert_eq!(open(&kernel, &mut proc, "gone"), FAILED);
        assert_eq!(proc.syscall(&kernel, SYS_FILESIZE, &[fd]).1, 16);
    }

    #[test]
    fn test_open_missing_and_reuse() {
        let kernel = boot();
        let mut proc = root_process("open");
        assert_eq!(open(&kernel, &mut proc, "missing"), FAILED);

        kernel.fs().with(|fs| fs.create("f", 0));
        let a = open(&kernel, &mut proc, "f");
        let b = open(&kernel, &mut proc, "f");
        assert_ne!(a, b);

        proc.syscall(&kernel, SYS_CLOSE, &[a]);
        assert_eq!(open(&kernel, &mut proc, "f"), a);
        assert_eq!(kernel.fs().with(|fs| fs.open_handles()), 2);
    }

    #[test]
    fn test_descriptors_have_separate_offsets() {
        let kernel = boot();
        let mut proc = root_process("offsets");
        kernel.fs().with(|fs| fs.create("f", 0));
        let a = open(&kernel, &mut proc, "f");
        let b = open(&kernel, &mut proc, "f");

        proc.put_bytes(BUF, b"hello");
        proc.syscall(&kernel, SYS_WRITE, &[a, BUF, 5]);
        assert_eq!(proc.syscall(&kernel, SYS_TELL, &[a]).1, 5);
        assert_eq!(proc.syscall(&kernel, SYS_TELL, &[b]).1, 0);
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[b, BUF + 8, 5]).1, 5);
        assert_eq!(proc.peek_bytes(BUF + 8, 5), b"hello");
    }

    #[test]
    fn test_descriptor_table_full() {
        let kernel = boot();
        let mut proc = root_process("many");
        kernel.fs().with(|fs| fs.create("f", 0));
        for _ in 2..FD_TABLE_SIZE {
            assert_ne!(open(&kernel, &mut proc, "f"), FAILED);
        }
        assert_eq!(open(&kernel, &mut proc, "f"), FAILED);
        assert_eq!(
            kernel.fs().with(|fs| fs.open_handles()),
            FD_TABLE_SIZE - 2
        );
    }

    #[test]
    fn test_bad_descriptors_fail_without_killing() {
        let kernel = boot();
        let mut proc = root_process("bad-fd");
        proc.put_bytes(BUF, b"data");
        for fd in [-1i32 as u32, 7, 0x8000_0000, FD_TABLE_SIZE as u32] {
            assert_eq!(proc.syscall(&kernel, SYS_READ, &[fd, BUF, 4]), (TrapExit::Resume, FAILED));
            assert_eq!(proc.syscall(&kernel, SYS_WRITE, &[fd, BUF, 4]), (TrapExit::Resume, FAILED));
            assert_eq!(proc.syscall(&kernel, SYS_FILESIZE, &[fd]).1, FAILED);
            assert_eq!(proc.syscall(&kernel, SYS_TELL, &[fd]).1, FAILED);
            assert_eq!(proc.syscall(&kernel, SYS_SEEK, &[fd, 0]).0, TrapExit::Resume);
            assert_eq!(proc.syscall(&kernel, SYS_CLOSE, &[fd]).0, TrapExit::Resume);
        }
        // Wrong direction on the console descriptors.
        assert_eq!(proc.syscall(&kernel, SYS_WRITE, &[0, BUF, 4]).1, FAILED);
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[1, BUF, 4]).1, FAILED);
        assert_eq!(proc.syscall(&kernel, SYS_CLOSE, &[0]).0, TrapExit::Resume);
        assert_eq!(proc.exit_status(), None);
    }

    #[test]
    fn test_double_close() {
        let kernel = boot();
        let mut proc = root_process("close-twice");
        kernel.fs().with(|fs| fs.create("f", 0));
        let fd = open(&kernel, &mut proc, "f");
        assert_eq!(proc.syscall(&kernel, SYS_CLOSE, &[fd]).0, TrapExit::Resume);
        assert_eq!(proc.syscall(&kernel, SYS_CLOSE, &[fd]).0, TrapExit::Resume);
        assert_eq!(kernel.fs().with(|fs| fs.open_handles()), 0);
    }

    #[test]
    fn test_stdout_write() {
        let kernel = boot();
        let mut proc = root_process("hello");
        let text = "x".repeat(PAGE_SIZE + 300);
        proc.put_bytes(DATA_PAGE, text.as_bytes());
        assert_eq!(
            proc.syscall(&kernel, SYS_WRITE, &[1, DATA_PAGE, text.len() as u32]).1,
            text.len() as u32
        );
        assert_eq!(kernel.console().output(), text);
        assert!(kernel.console().putbuf_calls() >= 2);
    }

    #[test]
    fn test_stdin_read() {
        let kernel = boot();
        let mut proc = root_process("keys");
        kernel.console().type_input(b"yes\n");
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[0, BUF, 4]).1, 4);
        assert_eq!(proc.peek_bytes(BUF, 4), b"yes\n");
    }

    #[test]
    fn test_zero_length_transfers() {
        let kernel = boot();
        let mut proc = root_process("empty");
        assert_eq!(proc.syscall(&kernel, SYS_WRITE, &[1, BUF, 0]).1, 0);
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[0, BUF, 0]).1, 0);
        assert_eq!(kernel.console().output(), "");
    }

    #[test]
    fn test_read_at_end_of_file() {
        let kernel = boot();
        let mut proc = root_process("eof");
        kernel.fs().with(|fs| fs.create("f", 3));
        let fd = open(&kernel, &mut proc, "f");
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[fd, BUF, 10]).1, 3);
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[fd, BUF, 10]).1, 0);
        proc.syscall(&kernel, SYS_SEEK, &[fd, 100]);
        assert_eq!(proc.syscall(&kernel, SYS_READ, &[fd, BUF, 10]).1, 0);
        assert_eq!(proc.syscall(&kernel, SYS_TELL, &[fd]).1, 100);
    }

    #[test]
    fn test_write_from_unmapped_buffer_terminates() {
        let kernel = boot();
        let mut proc = root_process("write-bad-ptr");
        kernel.fs().with(|fs| fs.create("f", 0));
        let fd = open(&kernel, &mut proc, "f");

        // Starts mapped, runs into the unmapped page after the data pages.
        let start = RO_PAGE + PAGE_SIZE as u32 - 4;
        let (exit, eax) = proc.syscall(&kernel, SYS_WRITE, &[fd, start, 8]);
        assert_eq!((exit, eax), (TrapExit::Terminate(-1), EAX_POISON));
        assert_eq!(kernel.fs().with(|fs| fs.contents("f")), Some(Vec::new()));
        assert_eq!(kernel.fs().with(|fs| fs.open_handles()), 0);
    }

    #[test]
    fn test_bad_buffer_beats_bad_descriptor() {
        let kernel = boot();
        let mut proc = root_process("read-bad-ptr");
        let (exit, _) = proc.syscall(&kernel, SYS_READ, &[99, 0xC000_0000, 4]);
        assert_eq!(exit, TrapExit::Terminate(-1));
    }

    #[test]
    fn test_read_into_read_only_page_terminates() {
        let kernel = boot();
        let mut proc = root_process("read-ro");
        kernel.fs().with(|fs| fs.create("f", 8));
        let fd = open(&kernel, &mut proc, "f");
        let (exit, _) = proc.syscall(&kernel, SYS_READ, &[fd, RO_PAGE, 8]);
        assert_eq!(exit, TrapExit::Terminate(-1));
        assert_eq!(kernel.console().output(), "read-ro: exit(-1)\n");
    }

    #[test]
    fn test_write_from_read_only_page() {
        let kernel = boot();
        let mut proc = root_process("write-ro");
        assert_eq!(proc.syscall(&kernel, SYS_WRITE, &[1, RO_PAGE, 4]).1, 4);
    }

    #[test]
    fn test_unterminated_name_terminates() {
        let kernel = boot();
        let mut proc = root_process("name");
        // Runs to the end of the data pages with no terminator.
        let tail = RO_PAGE - 16;
        proc.put_bytes(tail, &[b'a'; 16]);
        proc.space_mut().unmap(VirtAddr::new(RO_PAGE)).unwrap();
        let (exit, _) = proc.syscall(&kernel, SYS_OPEN, &[tail]);
        assert_eq!(exit, TrapExit::Terminate(-1));
    }
}
