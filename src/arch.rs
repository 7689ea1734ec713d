// Thin wrappers over the RISC-V control registers the kernel touches.
//
// Host builds get inert stand-ins so the policy code above them can be unit
// tested without a hart.

#[cfg(target_arch = "riscv64")]
mod imp {
    use riscv::register::{satp, sstatus, time};

    pub fn ticks() -> u64 {
        time::read() as u64
    }

    pub fn sstatus_bits() -> usize {
        let bits: usize;
        unsafe { core::arch::asm!("csrr {0}, sstatus", out(reg) bits, options(nomem, nostack)) };
        bits
    }

    pub fn satp_bits() -> usize {
        satp::read().bits()
    }

    /// Let S-mode touch pages mapped with the U bit.
    pub fn permit_user_memory_access() {
        unsafe { sstatus::set_sum() };
    }

    pub fn enable_supervisor_interrupts() {
        unsafe { sstatus::set_sie() };
    }

    pub fn wait_for_interrupt() {
        unsafe { riscv::asm::wfi() };
    }
}

#[cfg(not(target_arch = "riscv64"))]
mod imp {
    use core::sync::atomic::{AtomicU64, Ordering};

    static TICKS: AtomicU64 = AtomicU64::new(0);

    pub fn ticks() -> u64 {
        TICKS.fetch_add(1, Ordering::Relaxed)
    }

    pub fn sstatus_bits() -> usize {
        0
    }

    pub fn satp_bits() -> usize {
        0
    }

    pub fn permit_user_memory_access() {}

    pub fn enable_supervisor_interrupts() {}

    pub fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

pub use imp::*;
