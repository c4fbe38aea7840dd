//! Syscall Trap Entry
//!
//! User code raises `int 0x30` to enter the kernel. The low-level stub saves
//! the registers as a [`TrapFrame`] and calls [`handle_syscall`] on the
//! process's own kernel thread.
//!
//! # Privilege Levels
//! - Ring 3: user programs, the only legal origin of a syscall trap
//! - Ring 0: the kernel
//!
//! # Security Considerations
//! - The gate has DPL 3 so user code may raise it; every other part of the
//!   frame except `eax` is left exactly as saved
//! - A syscall trap from ring 0 is a kernel bug and halts with a diagnostic

use log::info;

use crate::drivers::console::Console;
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::mm::AddressSpace;
use crate::process::{Process, ProcessControl};

/// Interrupt vector of the syscall gate.
pub const SYSCALL_VECTOR: u8 = 0x30;

/// User code segment selector (GDT index 3, RPL 3).
pub const SEL_UCSEG: u32 = 0x1B;
/// User data segment selector (GDT index 4, RPL 3).
pub const SEL_UDSEG: u32 = 0x23;

/// Register state saved on entry, in the order the entry stub pushes it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers (pushal order)
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    /// Syscall return value
    pub eax: u32,
    /// Segment registers, zero-extended
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    /// Interrupt vector number
    pub vec_no: u32,
    pub error_code: u32,
    pub frame_pointer: u32,
    /// Pushed by the CPU
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    /// User stack pointer; the syscall number sits here
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// A frame as saved for a ring 3 syscall with stack pointer `esp`.
    pub fn with_stack(esp: u32) -> Self {
        Self {
            esp,
            cs: SEL_UCSEG,
            ss: SEL_UDSEG,
            ds: SEL_UDSEG,
            es: SEL_UDSEG,
            vec_no: SYSCALL_VECTOR as u32,
            ..Self::default()
        }
    }

    /// Privilege level the trap came from.
    #[inline]
    pub const fn privilege_level(&self) -> u8 {
        (self.cs & 0b11) as u8
    }
}

/// What the entry stub does after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapExit {
    /// Return to user mode with the (possibly updated) frame.
    Resume,
    /// The process was torn down with this status; never resume it.
    Terminate(i32),
    /// Power the machine off.
    Halt,
}

/// Interrupt state while the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    Off,
    On,
}

/// Description of an interrupt gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapGate {
    pub vector: u8,
    /// Lowest privilege level allowed to raise the vector with `int`.
    pub dpl: u8,
    pub level: IntrLevel,
    pub name: &'static str,
}

/// The syscall gate.
pub const SYSCALL_GATE: TrapGate = TrapGate {
    vector: SYSCALL_VECTOR,
    dpl: 3,
    level: IntrLevel::On,
    name: "syscall",
};

/// The interrupt-dispatch collaborator.
pub trait InterruptRegistry {
    /// Route `gate.vector` to the syscall entry stub.
    fn register_int(&mut self, gate: TrapGate);
}

/// Install the syscall gate.
///
/// Must be called once during kernel initialization.
pub fn init(intr: &mut impl InterruptRegistry) {
    intr.register_int(SYSCALL_GATE);
    info!("[BOOT] Syscall gate installed at vector {:#x}", SYSCALL_VECTOR);
}

/// Handle a syscall trap from user mode.
///
/// Returns only if the process is to be resumed.
///
/// # Panics
/// If the frame did not come from ring 3.
pub fn handle_syscall<F, C, P, A>(
    kernel: &Kernel<F, C, P>,
    proc: &mut Process<A, F::File>,
    frame: &mut TrapFrame,
) where
    F: FileSystem,
    C: Console,
    P: ProcessControl<F>,
    A: AddressSpace,
{
    assert_eq!(
        frame.privilege_level(),
        3,
        "syscall trap from kernel mode at eip {:#010x}",
        frame.eip
    );

    match kernel.dispatch(proc, frame) {
        TrapExit::Resume => {}
        TrapExit::Terminate(_) => kernel.procs().exit_thread(),
        TrapExit::Halt => kernel.procs().power_off(),
    }
}
