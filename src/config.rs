// Compile-time kernel configuration for rvos

use log::LevelFilter;

/// Number of slots in the process table.
pub const MAX_PROCESSES: usize = 64;

/// Size of the stack region owned by each process slot.
pub const STACK_SIZE: usize = 8192;

/// Process name capacity, including the terminating NUL.
pub const PROC_NAME_LEN: usize = 32;

/// Descriptor slots per process.
pub const PROC_MAX_FDS: usize = 16;

/// Files the flat store can hold.
pub const MAX_FILES: usize = 32;

/// File name capacity, including the terminating NUL.
pub const MAX_FILENAME: usize = 64;

/// Largest size a single file may grow to.
pub const MAX_FILESIZE: usize = 4096;

/// Storage-level open descriptors shared by all processes.
pub const MAX_FDS: usize = 64;

/// Kernel heap backing process stacks and file contents.
pub const HEAP_SIZE: usize = 1024 * 1024;

/// Stack the trap vector switches to through `sscratch`.
pub const TRAP_STACK_SIZE: usize = 16 * 1024;

/// MMIO base of the 16550 UART on the QEMU `virt` machine.
pub const UART_BASE: usize = 0x1000_0000;

/// Maximum level passed to the `log` facade at boot.
pub const LOG_LEVEL: LevelFilter = LevelFilter::Info;
