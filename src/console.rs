// Console output for rvos: character primitive, print macros and the log backend
use core::fmt::{self, Write};
use lazy_static::lazy_static;
use spin::Mutex;

use crate::config;

#[cfg(target_arch = "riscv64")]
use uart_16550::MmioSerialPort;

/// Character sink behind `putchar`, `print!` and the kernel logger.
pub struct Console {
    #[cfg(target_arch = "riscv64")]
    port: MmioSerialPort,
    #[cfg(not(target_arch = "riscv64"))]
    captured: alloc::vec::Vec<u8>,
}

impl Console {
    #[cfg(target_arch = "riscv64")]
    fn new() -> Self {
        // The QEMU virt machine places a 16550 at UART_BASE and OpenSBI leaves
        // it configured; `init` only re-asserts 8N1 and the FIFO setup.
        let mut port = unsafe { MmioSerialPort::new(config::UART_BASE) };
        port.init();
        Self { port }
    }

    #[cfg(not(target_arch = "riscv64"))]
    fn new() -> Self {
        Self { captured: alloc::vec::Vec::new() }
    }

    /// Emit one raw byte.
    pub fn putchar(&mut self, byte: u8) {
        #[cfg(target_arch = "riscv64")]
        self.port.send(byte);
        #[cfg(not(target_arch = "riscv64"))]
        self.captured.push(byte);
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putchar(b'\r');
            }
            self.putchar(byte);
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref CONSOLE: Mutex<Console> = Mutex::new(Console::new());
}

/// Single-character emit used by the `putchar` system call.
pub fn putchar(byte: u8) {
    CONSOLE.lock().putchar(byte);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // Console writes are infallible.
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Drain everything written to the console so far (host builds only).
#[cfg(not(target_arch = "riscv64"))]
pub fn take_output() -> alloc::vec::Vec<u8> {
    core::mem::take(&mut CONSOLE.lock().captured)
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// `log` backend writing level-prefixed lines to the console.
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the console logger. Called once during boot.
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(config::LOG_LEVEL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_is_expanded_for_the_terminal() {
        let mut console = Console::new();
        write!(console, "a\nb").unwrap();
        assert_eq!(console.captured, b"a\r\nb");
    }

    #[test]
    fn putchar_emits_the_byte_untouched() {
        let mut console = Console::new();
        console.putchar(b'\n');
        console.putchar(b'x');
        assert_eq!(console.captured, b"\nx");
    }
}
