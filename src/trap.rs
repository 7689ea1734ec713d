// Trap entry and classification for rvos
//
// Every trap lands in `trap_vector`, which swaps onto the dedicated trap stack
// through `sscratch`, spills the interrupted registers into a `TrapFrame` and
// calls `trap_handler`. Whatever the kernel leaves in that frame is what
// `sret` resumes.
use log::{info, warn};

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::process::switch_frame;
use crate::syscalls;

/// Registers spilled by `trap_vector`, in RISC-V numbering, plus `sepc`.
///
/// The layout is shared with the assembly below: `regs[n]` lives at offset
/// `8 * n` and `sepc` at 256.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: [u64; 32],
    pub sepc: u64,
}

impl TrapFrame {
    pub const A0: usize = 10;
    pub const A1: usize = 11;
    pub const A2: usize = 12;
    pub const A7: usize = 17;
}

const INTERRUPT_BIT: u64 = 1 << 63;

/// What `scause` says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    Interrupt(u64),
    UserEcall,
    InstructionPageFault,
    LoadPageFault,
    StorePageFault,
    Exception(u64),
}

impl TrapCause {
    pub fn from_scause(scause: u64) -> Self {
        if scause & INTERRUPT_BIT != 0 {
            return TrapCause::Interrupt(scause & !INTERRUPT_BIT);
        }
        match scause {
            8 => TrapCause::UserEcall,
            12 => TrapCause::InstructionPageFault,
            13 => TrapCause::LoadPageFault,
            15 => TrapCause::StorePageFault,
            code => TrapCause::Exception(code),
        }
    }
}

/// Handle one trap taken with `frame` on the trap stack.
///
/// Only an ecall from U-mode changes the frame on its own: the syscall result
/// goes to `a0` and `sepc` moves past the `ecall`. Faults and interrupts are
/// reported and execution resumes where it stopped. If the syscall moved the
/// Running state, the frame is switched to the new current process last.
pub fn dispatch(kernel: &mut Kernel, frame: &mut TrapFrame, scause: u64, stval: u64) {
    let from = kernel.processes.current_pid();

    match TrapCause::from_scause(scause) {
        TrapCause::Interrupt(code) => {
            info!("Interrupt {} at PC 0x{:x}", code, frame.sepc);
        }
        TrapCause::UserEcall => {
            syscalls::dispatch(kernel, frame);
            frame.sepc = frame.sepc.wrapping_add(4);
        }
        TrapCause::InstructionPageFault => {
            warn!("Instruction page fault at 0x{:x} (addr: 0x{:x})", frame.sepc, stval);
        }
        TrapCause::LoadPageFault => {
            warn!("Load page fault at 0x{:x} (addr: 0x{:x})", frame.sepc, stval);
        }
        TrapCause::StorePageFault => {
            warn!("Store page fault at 0x{:x} (addr: 0x{:x})", frame.sepc, stval);
        }
        TrapCause::Exception(code) => {
            warn!(
                "{}: exception {} at PC 0x{:x}, stval: 0x{:x}",
                KernelError::UnclassifiedTrap,
                code,
                frame.sepc,
                stval
            );
        }
    }

    switch_frame(&mut kernel.processes, from, frame);
}

#[cfg(target_arch = "riscv64")]
mod vector {
    use log::info;
    use riscv::register::{scause, sscratch, stval, stvec};

    use super::TrapFrame;
    use crate::arch;
    use crate::config::TRAP_STACK_SIZE;
    use crate::kernel::KERNEL;

    #[repr(C, align(16))]
    struct TrapStack([u8; TRAP_STACK_SIZE]);

    static mut TRAP_STACK: TrapStack = TrapStack([0; TRAP_STACK_SIZE]);

    // 33 saved words rounded up to keep sp 16-byte aligned.
    core::arch::global_asm!(
        ".section .text",
        ".global trap_vector",
        ".align 4",
        "trap_vector:",
        "    csrrw sp, sscratch, sp",
        "    addi  sp, sp, -272",
        "    sd    x1, 8(sp)",
        "    sd    x3, 24(sp)",
        "    sd    x4, 32(sp)",
        "    sd    x5, 40(sp)",
        "    sd    x6, 48(sp)",
        "    sd    x7, 56(sp)",
        "    sd    x8, 64(sp)",
        "    sd    x9, 72(sp)",
        "    sd    x10, 80(sp)",
        "    sd    x11, 88(sp)",
        "    sd    x12, 96(sp)",
        "    sd    x13, 104(sp)",
        "    sd    x14, 112(sp)",
        "    sd    x15, 120(sp)",
        "    sd    x16, 128(sp)",
        "    sd    x17, 136(sp)",
        "    sd    x18, 144(sp)",
        "    sd    x19, 152(sp)",
        "    sd    x20, 160(sp)",
        "    sd    x21, 168(sp)",
        "    sd    x22, 176(sp)",
        "    sd    x23, 184(sp)",
        "    sd    x24, 192(sp)",
        "    sd    x25, 200(sp)",
        "    sd    x26, 208(sp)",
        "    sd    x27, 216(sp)",
        "    sd    x28, 224(sp)",
        "    sd    x29, 232(sp)",
        "    sd    x30, 240(sp)",
        "    sd    x31, 248(sp)",
        "    csrr  t0, sscratch",
        "    sd    t0, 16(sp)",
        "    csrr  t0, sepc",
        "    sd    t0, 256(sp)",
        "    mv    a0, sp",
        "    call  trap_handler",
        "    ld    t0, 256(sp)",
        "    csrw  sepc, t0",
        "    addi  t0, sp, 272",
        "    csrw  sscratch, t0",
        "    ld    x1, 8(sp)",
        "    ld    x3, 24(sp)",
        "    ld    x4, 32(sp)",
        "    ld    x5, 40(sp)",
        "    ld    x6, 48(sp)",
        "    ld    x7, 56(sp)",
        "    ld    x8, 64(sp)",
        "    ld    x9, 72(sp)",
        "    ld    x10, 80(sp)",
        "    ld    x11, 88(sp)",
        "    ld    x12, 96(sp)",
        "    ld    x13, 104(sp)",
        "    ld    x14, 112(sp)",
        "    ld    x15, 120(sp)",
        "    ld    x16, 128(sp)",
        "    ld    x17, 136(sp)",
        "    ld    x18, 144(sp)",
        "    ld    x19, 152(sp)",
        "    ld    x20, 160(sp)",
        "    ld    x21, 168(sp)",
        "    ld    x22, 176(sp)",
        "    ld    x23, 184(sp)",
        "    ld    x24, 192(sp)",
        "    ld    x25, 200(sp)",
        "    ld    x26, 208(sp)",
        "    ld    x27, 216(sp)",
        "    ld    x28, 224(sp)",
        "    ld    x29, 232(sp)",
        "    ld    x30, 240(sp)",
        "    ld    x31, 248(sp)",
        "    ld    sp, 16(sp)",
        "    sret",
    );

    extern "C" {
        fn trap_vector();
    }

    #[no_mangle]
    extern "C" fn trap_handler(frame: &mut TrapFrame) {
        let cause = scause::read().bits() as u64;
        let tval = stval::read() as u64;
        KERNEL.lock().handle_trap(frame, cause, tval);
    }

    /// Point `stvec` at the vector, arm `sscratch` and enable interrupts.
    pub fn init() {
        info!("Initializing trap handlers...");
        let vector = trap_vector as usize;
        // SAFETY: the trap stack is only ever touched by `trap_vector`, and
        // traps do not nest.
        let stack_top = unsafe { core::ptr::addr_of!(TRAP_STACK) as usize } + TRAP_STACK_SIZE;
        unsafe {
            sscratch::write(stack_top);
            stvec::write(vector, stvec::TrapMode::Direct);
        }
        arch::enable_supervisor_interrupts();
        info!("Trap vector at: 0x{:x}", vector);
        info!("Traps initialized!");
    }
}

#[cfg(target_arch = "riscv64")]
pub use vector::init;
