//! Host-side stand-ins for the kernel's collaborators.
//!
//! `MemFs` counts how many callers are inside it at once, `TestConsole`
//! records output, and `FakeLoader` runs each child program on its own
//! host thread against the shared [`TestKernel`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use spin::{Mutex, Once};

use crate::drivers::console::Console;
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::mm::{PageDirectory, PageFlags, VirtAddr, PAGE_SIZE, PHYS_BASE};
use crate::process::{process_name, LoadError, Pid, Process, ProcessControl, SlotId};
use crate::trap::{TrapExit, TrapFrame};

/// Written to `eax` before every trap, to spot replies that leave it alone.
pub const EAX_POISON: u32 = 0xDEAD_BEEF;

/// Top page of the user stack.
pub const STACK_PAGE: u32 = PHYS_BASE - PAGE_SIZE as u32;
/// Two writable data pages start here.
pub const DATA_PAGE: u32 = 0x0804_8000;
/// Read-only page right after the data pages; the page after it is unmapped.
pub const RO_PAGE: u32 = DATA_PAGE + 2 * PAGE_SIZE as u32;

/// Where test syscalls place their number and arguments.
const CALL_ESP: u32 = PHYS_BASE - 64;

/// Longest name `MemFs` accepts, as in the Pintos filesystem.
const MEMFS_NAME_MAX: usize = 14;

pub type TestKernel = Kernel<MemFs, TestConsole, FakeLoader>;
pub type TestProcess = Process<PageDirectory, MemFile>;

/// Body of a child program.
pub type Program = fn(&TestKernel, &mut TestProcess);

#[derive(Default)]
struct ProbeCounters {
    active: AtomicUsize,
    peak: AtomicUsize,
    entries: AtomicUsize,
}

/// Shared view of `MemFs` entry counters.
#[derive(Clone, Default)]
pub struct FsProbe(Arc<ProbeCounters>);

struct ProbeGuard<'a>(&'a ProbeCounters);

impl FsProbe {
    fn enter(&self) -> ProbeGuard<'_> {
        let counters = &*self.0;
        counters.entries.fetch_add(1, Ordering::SeqCst);
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        // Widen the window for an overlapping caller.
        thread::yield_now();
        ProbeGuard(counters)
    }

    /// Total calls into the filesystem.
    pub fn entries(&self) -> usize {
        self.0.entries.load(Ordering::SeqCst)
    }

    /// Most callers ever inside the filesystem at once.
    pub fn max_concurrent(&self) -> usize {
        self.0.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open `MemFs` file. Survives removal of its name.
#[derive(Debug)]
pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
}

/// In-memory flat filesystem.
#[derive(Default)]
pub struct MemFs {
    files: BTreeMap<String, Arc<Mutex<Vec<u8>>>>,
    open: usize,
    probe: FsProbe,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> FsProbe {
        self.probe.clone()
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(|data| data.lock().clone())
    }
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn create(&mut self, name: &str, initial_size: u32) -> bool {
        let _entry = self.probe.enter();
        if name.is_empty() || name.len() > MEMFS_NAME_MAX || self.files.contains_key(name) {
            return false;
        }
        let data = vec![0; initial_size as usize];
        self.files.insert(name.to_string(), Arc::new(Mutex::new(data)));
        true
    }

    fn remove(&mut self, name: &str) -> bool {
        let _entry = self.probe.enter();
        self.files.remove(name).is_some()
    }

    fn open(&mut self, name: &str) -> Option<MemFile> {
        let _entry = self.probe.enter();
        let data = Arc::clone(self.files.get(name)?);
        self.open += 1;
        Some(MemFile { data })
    }

    fn length(&mut self, file: &MemFile) -> u32 {
        let _entry = self.probe.enter();
        file.data.lock().len() as u32
    }

    fn read_at(&mut self, file: &mut MemFile, buf: &mut [u8], offset: u32) -> usize {
        let _entry = self.probe.enter();
        let data = file.data.lock();
        let start = offset as usize;
        if start >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    fn write_at(&mut self, file: &mut MemFile, buf: &[u8], offset: u32) -> usize {
        let _entry = self.probe.enter();
        let mut data = file.data.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        buf.len()
    }

    fn close(&mut self, _file: MemFile) {
        let _entry = self.probe.enter();
        self.open -= 1;
    }
}

/// Console with a scripted keyboard and a captured screen.
#[derive(Default)]
pub struct TestConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
    putbufs: AtomicUsize,
}

impl TestConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keyboard input.
    pub fn type_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    pub fn putbuf_calls(&self) -> usize {
        self.putbufs.load(Ordering::SeqCst)
    }
}

impl Console for TestConsole {
    fn getc(&self) -> u8 {
        loop {
            if let Some(byte) = self.input.lock().pop_front() {
                return byte;
            }
            thread::yield_now();
        }
    }

    fn putbuf(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
        self.putbufs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader that runs registered programs on host threads.
///
/// A program is loadable when a file of its name exists and a body has been
/// installed for it.
pub struct FakeLoader {
    kernel: Once<Weak<TestKernel>>,
    programs: Mutex<BTreeMap<String, Program>>,
    next_pid: AtomicI32,
    children: Mutex<Vec<JoinHandle<()>>>,
    spawned: AtomicUsize,
    yields: AtomicUsize,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            kernel: Once::new(),
            programs: Mutex::new(BTreeMap::new()),
            next_pid: AtomicI32::new(2),
            children: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
            yields: AtomicUsize::new(0),
        }
    }

    fn attach(&self, kernel: &Arc<TestKernel>) {
        self.kernel.call_once(|| Arc::downgrade(kernel));
    }

    pub fn install(&self, name: &str, program: Program) {
        self.programs.lock().insert(name.to_string(), program);
    }

    /// Children started so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Times a waiting parent gave up the CPU.
    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }

    /// Join every child thread, including children of children.
    pub fn join_children(&self) {
        loop {
            let next = self.children.lock().pop();
            match next {
                Some(child) => child.join().unwrap(),
                None => break,
            }
        }
    }
}

impl ProcessControl<MemFs> for FakeLoader {
    fn spawn(&self, fs: &mut MemFs, cmdline: &str, slot: SlotId) -> Result<Pid, LoadError> {
        let name = process_name(cmdline);
        let image = fs.open(name).ok_or(LoadError::NotFound)?;
        fs.close(image);

        let program = self
            .programs
            .lock()
            .get(name)
            .copied()
            .ok_or(LoadError::BadExecutable)?;
        let kernel = self
            .kernel
            .get()
            .and_then(Weak::upgrade)
            .ok_or(LoadError::OutOfResources)?;

        let pid = Pid::new(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let mut child = Process::child(pid, name, slot, user_space());
        let handle = thread::spawn(move || {
            program(&kernel, &mut child);
            // Falling off the end of main is exit(0).
            kernel.terminate(&mut child, 0);
        });
        self.children.lock().push(handle);
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(pid)
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        thread::yield_now();
    }

    fn exit_thread(&self) -> ! {
        panic!("thread exit")
    }

    fn power_off(&self) -> ! {
        panic!("power off")
    }
}

/// Address space with a stack page, two data pages and a read-only page.
pub fn user_space() -> PageDirectory {
    let mut space = PageDirectory::new();
    let layout = [
        (STACK_PAGE, PageFlags::USER_RW),
        (DATA_PAGE, PageFlags::USER_RW),
        (DATA_PAGE + PAGE_SIZE as u32, PageFlags::USER_RW),
        (RO_PAGE, PageFlags::USER_RO),
    ];
    for (page, flags) in layout {
        space.map(VirtAddr::new(page), flags).unwrap();
    }
    space
}

/// A kernel wired to fresh test doubles.
pub fn boot() -> Arc<TestKernel> {
    let kernel = Arc::new(Kernel::new(MemFs::new(), TestConsole::new(), FakeLoader::new()));
    kernel.procs().attach(&kernel);
    kernel
}

/// A first process, with no parent.
pub fn root_process(name: &str) -> TestProcess {
    Process::new(Pid::new(1), name, user_space())
}

/// What a user program does to its own memory and to the kernel.
pub trait UserProgram {
    fn poke_word(&mut self, addr: u32, word: u32);
    fn put_bytes(&mut self, addr: u32, bytes: &[u8]);
    /// Store `s` with its NUL terminator.
    fn put_str(&mut self, addr: u32, s: &str);
    fn peek_bytes(&self, addr: u32, len: usize) -> Vec<u8>;
    /// Push a syscall number and its arguments, returning the stack pointer.
    fn push_call(&mut self, nr: u32, args: &[u32]) -> u32;
    /// Trap into `kernel`, returning the outcome and the final `eax`.
    fn syscall(&mut self, kernel: &TestKernel, nr: u32, args: &[u32]) -> (TrapExit, u32);
}

impl UserProgram for TestProcess {
    fn poke_word(&mut self, addr: u32, word: u32) {
        self.put_bytes(addr, &word.to_le_bytes());
    }

    fn put_bytes(&mut self, addr: u32, bytes: &[u8]) {
        self.space_mut().poke(VirtAddr::new(addr), bytes).unwrap();
    }

    fn put_str(&mut self, addr: u32, s: &str) {
        self.put_bytes(addr, s.as_bytes());
        self.put_bytes(addr + s.len() as u32, &[0]);
    }

    fn peek_bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.space().peek(VirtAddr::new(addr), &mut buf).unwrap();
        buf
    }

    fn push_call(&mut self, nr: u32, args: &[u32]) -> u32 {
        self.poke_word(CALL_ESP, nr);
        for (i, &arg) in args.iter().enumerate() {
            self.poke_word(CALL_ESP + 4 * (i as u32 + 1), arg);
        }
        CALL_ESP
    }

    fn syscall(&mut self, kernel: &TestKernel, nr: u32, args: &[u32]) -> (TrapExit, u32) {
        let esp = self.push_call(nr, args);
        let mut frame = TrapFrame::with_stack(esp);
        frame.eax = EAX_POISON;
        let exit = kernel.dispatch(self, &mut frame);
        (exit, frame.eax)
    }
}
