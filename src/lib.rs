#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod allocator;
pub mod arch;
pub mod config;
pub mod console;
pub mod error;
pub mod kernel;
pub mod paging;
pub mod process;
pub mod services;
pub mod syscalls;
pub mod trap;

pub use error::{KernelError, KernelResult};

/// Bring up every kernel subsystem in boot order.
///
/// Expects the logger to be installed already. Traps are enabled last, once
/// the state they touch exists.
pub fn init() {
    allocator::init_heap();
    paging::init();
    kernel::KERNEL.lock().init();
    #[cfg(target_arch = "riscv64")]
    trap::init();
}

/// Park the hart between interrupts, forever.
pub fn idle_loop() -> ! {
    loop {
        arch::wait_for_interrupt();
    }
}
