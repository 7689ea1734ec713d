// System call dispatch for rvos
use log::{debug, warn};

use crate::config::MAX_FILESIZE;
use crate::console;
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::process::Pid;
use crate::services::file_system_service::OpenFlags;
use crate::trap::TrapFrame;

/// Longest path `open` and `exec` will scan for a terminating NUL.
const MAX_PATH: usize = 256;

/// System call numbers
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Exit = 1,
    Fork = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    Wait = 7,
    Exec = 8,
    GetPid = 9,
    Kill = 10,
    PutChar = 100,
}

impl TryFrom<u64> for Syscall {
    type Error = u64;

    fn try_from(number: u64) -> Result<Self, Self::Error> {
        Ok(match number {
            1 => Syscall::Exit,
            2 => Syscall::Fork,
            3 => Syscall::Read,
            4 => Syscall::Write,
            5 => Syscall::Open,
            6 => Syscall::Close,
            7 => Syscall::Wait,
            8 => Syscall::Exec,
            9 => Syscall::GetPid,
            10 => Syscall::Kill,
            100 => Syscall::PutChar,
            other => return Err(other),
        })
    }
}

/// System call arguments (a0..a2, number in a7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs {
    pub number: u64,
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
}

impl SyscallArgs {
    pub fn from_frame(frame: &TrapFrame) -> Self {
        Self {
            number: frame.regs[TrapFrame::A7],
            arg0: frame.regs[TrapFrame::A0],
            arg1: frame.regs[TrapFrame::A1],
            arg2: frame.regs[TrapFrame::A2],
        }
    }
}

/// Run the call described by `frame` and write its result into `a0`.
///
/// Exactly one operation runs per trap. Failures of any kind become the
/// ABI sentinel; the reason only goes to the log.
pub fn dispatch(kernel: &mut Kernel, frame: &mut TrapFrame) {
    let args = SyscallArgs::from_frame(frame);
    let result = match Syscall::try_from(args.number) {
        Ok(call) => handle_syscall(kernel, call, args),
        Err(number) => {
            warn!("{}: Function not implemented!", number);
            Err(KernelError::Unimplemented)
        }
    };

    frame.regs[TrapFrame::A0] = match result {
        Ok(value) => value,
        Err(err) => {
            debug!("[SYSCALL] {:?} failed: {}", args, err);
            err.into_abi()
        }
    };
}

/// Handle a decoded system call
pub fn handle_syscall(kernel: &mut Kernel, call: Syscall, args: SyscallArgs) -> KernelResult<u64> {
    match call {
        Syscall::Exit => sys_exit(kernel, args),
        Syscall::Fork => kernel.processes.fork().map(u64::from),
        Syscall::Read => sys_read(kernel, args),
        Syscall::Write => sys_write(kernel, args),
        Syscall::Open => sys_open(kernel, args),
        Syscall::Close => sys_close(kernel, args),
        Syscall::Wait => sys_wait(kernel, args),
        Syscall::Exec => sys_exec(kernel, args),
        Syscall::GetPid => sys_getpid(kernel),
        Syscall::Kill => sys_kill(kernel, args),
        Syscall::PutChar => {
            console::putchar(args.arg0 as u8);
            Ok(0)
        }
    }
}

fn sys_exit(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    kernel.processes.exit(args.arg0 as i32);
    Ok(0)
}

fn sys_read(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    let fd = storage_fd(kernel, args.arg0)?;
    let len = clamp_len(args.arg2);
    // SAFETY: every process shares the kernel's identity-mapped address space.
    let buf = unsafe { user_slice_mut(args.arg1, len)? };
    kernel.files.read(fd, buf).map(|n| n as u64)
}

fn sys_write(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    let fd = storage_fd(kernel, args.arg0)?;
    let len = clamp_len(args.arg2);
    // SAFETY: as in `sys_read`.
    let buf = unsafe { user_slice(args.arg1, len)? };
    kernel.files.write(fd, buf).map(|n| n as u64)
}

fn sys_open(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    // SAFETY: as in `sys_read`.
    let path = unsafe { user_str(args.arg0)? };
    let flags = OpenFlags::from_bits(args.arg1 as u32);

    if kernel.processes.current().is_none() {
        return Err(KernelError::NoCurrentProcess);
    }
    let storage = kernel.files.open(path, flags)?;

    let installed = kernel
        .processes
        .current_mut()
        .and_then(|process| process.fds.install(storage));
    match installed {
        Some(local) => {
            debug!("open '{}' -> fd {} (storage {})", path, local, storage);
            Ok(local as u64)
        }
        None => {
            warn!("open '{}': process descriptor table full", path);
            kernel.files.close(storage)?;
            Err(KernelError::ResourceExhausted)
        }
    }
}

fn sys_close(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    let process = kernel.processes.current_mut().ok_or(KernelError::NoCurrentProcess)?;
    let local = usize::try_from(args.arg0).map_err(|_| KernelError::NotFound)?;
    let storage = process.fds.release(local).ok_or(KernelError::NotFound)?;
    kernel.files.close(storage).map(|_| 0)
}

fn sys_wait(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    let mut status = 0;
    let reaped = kernel.processes.wait(Some(&mut status))?;

    for storage in reaped.leaked.open() {
        if kernel.files.close(storage).is_ok() {
            debug!("Closed storage fd {} left open by PID {}", storage, reaped.pid);
        }
    }

    if args.arg0 != 0 {
        // SAFETY: as in `sys_read`.
        let out = unsafe { user_slice_mut(args.arg0, core::mem::size_of::<i32>())? };
        out.copy_from_slice(&status.to_ne_bytes());
    }
    Ok(u64::from(reaped.pid))
}

fn sys_exec(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    // SAFETY: as in `sys_read`.
    let path = unsafe { user_str(args.arg0)? };
    kernel.processes.exec(path).map(|_| 0)
}

fn sys_getpid(kernel: &Kernel) -> KernelResult<u64> {
    kernel
        .processes
        .current()
        .map(|process| u64::from(process.pid))
        .ok_or(KernelError::NoCurrentProcess)
}

fn sys_kill(kernel: &mut Kernel, args: SyscallArgs) -> KernelResult<u64> {
    let pid = Pid::try_from(args.arg0).map_err(|_| KernelError::NotFound)?;
    kernel.processes.kill(pid, args.arg1 as i32).map(|_| 0)
}

/// Storage descriptor behind the current process's local `fd`.
fn storage_fd(kernel: &Kernel, fd: u64) -> KernelResult<usize> {
    let process = kernel.processes.current().ok_or(KernelError::NoCurrentProcess)?;
    let local = usize::try_from(fd).map_err(|_| KernelError::NotFound)?;
    process.fds.lookup(local).ok_or(KernelError::NotFound)
}

/// No file holds more than `MAX_FILESIZE` bytes, so no transfer needs more.
fn clamp_len(len: u64) -> usize {
    usize::try_from(len).unwrap_or(usize::MAX).min(MAX_FILESIZE)
}

/// # Safety
/// `addr..addr + len` must be mapped and not aliased for the returned lifetime.
unsafe fn user_slice<'a>(addr: u64, len: usize) -> KernelResult<&'a [u8]> {
    if addr == 0 {
        return Err(KernelError::InvalidArgument);
    }
    Ok(core::slice::from_raw_parts(addr as usize as *const u8, len))
}

/// # Safety
/// As for [`user_slice`], and the range must be writable.
unsafe fn user_slice_mut<'a>(addr: u64, len: usize) -> KernelResult<&'a mut [u8]> {
    if addr == 0 {
        return Err(KernelError::InvalidArgument);
    }
    Ok(core::slice::from_raw_parts_mut(addr as usize as *mut u8, len))
}

/// NUL-terminated UTF-8 string at `addr`, at most `MAX_PATH` bytes long.
///
/// # Safety
/// Bytes from `addr` up to the NUL (or `MAX_PATH`) must be mapped.
unsafe fn user_str<'a>(addr: u64) -> KernelResult<&'a str> {
    if addr == 0 {
        return Err(KernelError::InvalidArgument);
    }
    let base = addr as usize as *const u8;
    let len = (0..MAX_PATH)
        .find(|&i| *base.add(i) == 0)
        .ok_or(KernelError::InvalidArgument)?;
    core::str::from_utf8(core::slice::from_raw_parts(base, len)).map_err(|_| KernelError::InvalidArgument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessState, INIT_PID, SIGKILL};
    use crate::services::file_system_service::{O_CREAT, O_RDONLY, O_RDWR, O_WRONLY};

    const SENTINEL: u64 = u64::MAX;

    fn booted() -> Kernel {
        let mut kernel = Kernel::new();
        kernel.init();
        kernel
    }

    fn call(kernel: &mut Kernel, number: u64, a0: u64, a1: u64, a2: u64) -> u64 {
        let mut frame = TrapFrame::default();
        frame.regs[TrapFrame::A7] = number;
        frame.regs[TrapFrame::A0] = a0;
        frame.regs[TrapFrame::A1] = a1;
        frame.regs[TrapFrame::A2] = a2;
        dispatch(kernel, &mut frame);
        frame.regs[TrapFrame::A0]
    }

    fn addr<T: ?Sized>(value: &T) -> u64 {
        value as *const T as *const u8 as u64
    }

    fn open(kernel: &mut Kernel, path: &[u8], flags: u32) -> u64 {
        call(kernel, Syscall::Open as u64, addr(path), flags as u64, 0)
    }

    #[test]
    fn numbers_decode_to_a_closed_set() {
        for number in [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 100] {
            assert_eq!(Syscall::try_from(number).map(|s| s as u64), Ok(number));
        }
        for number in [0, 11, 99, 101, u64::MAX] {
            assert_eq!(Syscall::try_from(number), Err(number));
        }
    }

    #[test]
    fn every_number_writes_a0() {
        // a0 holds a valid path so calls that take a pointer stay in bounds
        let probe = b"/probe\0";
        for number in [0u64, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 100, 255] {
            let mut kernel = booted();
            let mut frame = TrapFrame::default();
            frame.regs[TrapFrame::A7] = number;
            frame.regs[TrapFrame::A0] = addr(probe);
            dispatch(&mut kernel, &mut frame);
            assert_ne!(frame.regs[TrapFrame::A0], addr(probe), "call {number}");
        }
    }

    #[test]
    fn unknown_number_fails() {
        let mut kernel = booted();
        assert_eq!(call(&mut kernel, 42, 0, 0, 0), SENTINEL);
    }

    #[test]
    fn getpid_reports_current_process() {
        let mut kernel = booted();
        assert_eq!(call(&mut kernel, Syscall::GetPid as u64, 0, 0, 0), INIT_PID as u64);
        kernel.processes.create("a", 0x8030_0000).unwrap();
        kernel.processes.yield_now();
        assert_eq!(call(&mut kernel, Syscall::GetPid as u64, 0, 0, 0), 2);
    }

    #[test]
    fn fork_and_exec_fail() {
        let mut kernel = booted();
        assert_eq!(call(&mut kernel, Syscall::Fork as u64, 0, 0, 0), SENTINEL);
        assert_eq!(call(&mut kernel, Syscall::Exec as u64, addr(b"/bin/sh\0"), 0, 0), SENTINEL);
        assert_eq!(call(&mut kernel, Syscall::Exec as u64, 0, 0, 0), SENTINEL);
        assert_eq!(kernel.processes.stats().total_processes, 1);
    }

    #[test]
    fn file_round_trip_through_syscalls() {
        let mut kernel = booted();
        let fd = open(&mut kernel, b"/hello.txt\0", O_RDWR | O_CREAT);
        assert_eq!(fd, 0);

        let msg = b"Hello from the flat store";
        assert_eq!(call(&mut kernel, Syscall::Write as u64, fd, addr(msg), msg.len() as u64), msg.len() as u64);
        assert_eq!(call(&mut kernel, Syscall::Close as u64, fd, 0, 0), 0);

        let fd = open(&mut kernel, b"/hello.txt\0", O_RDONLY);
        let mut buf = [0u8; 64];
        let n = call(&mut kernel, Syscall::Read as u64, fd, buf.as_mut_ptr() as u64, buf.len() as u64);
        assert_eq!(n, msg.len() as u64);
        assert_eq!(&buf[..msg.len()], msg);
    }

    #[test]
    fn write_to_read_only_descriptor_fails() {
        let mut kernel = booted();
        let fd = open(&mut kernel, b"/ro.txt\0", O_RDONLY | O_CREAT);
        assert_ne!(fd, SENTINEL);
        let data = b"nope";
        assert_eq!(call(&mut kernel, Syscall::Write as u64, fd, addr(data), 4), SENTINEL);
        assert_eq!(kernel.files.file_size("/ro.txt"), Some(0));
    }

    #[test]
    fn open_without_create_fails_for_missing_file() {
        let mut kernel = booted();
        assert_eq!(open(&mut kernel, b"/missing\0", O_RDONLY), SENTINEL);
        assert_eq!(kernel.files.open_descriptors(), 0);
    }

    #[test]
    fn bad_user_pointers_fail() {
        let mut kernel = booted();
        assert_eq!(call(&mut kernel, Syscall::Open as u64, 0, O_CREAT as u64, 0), SENTINEL);
        let fd = open(&mut kernel, b"/f\0", O_WRONLY | O_CREAT);
        assert_eq!(call(&mut kernel, Syscall::Write as u64, fd, 0, 8), SENTINEL);
        // no NUL within reach
        let unterminated = [b'a'; MAX_PATH + 8];
        assert_eq!(call(&mut kernel, Syscall::Open as u64, addr(&unterminated), O_CREAT as u64, 0), SENTINEL);
    }

    #[test]
    fn descriptors_are_per_process() {
        let mut kernel = booted();
        let fd = open(&mut kernel, b"/shared\0", O_RDWR | O_CREAT);
        kernel.processes.create("other", 0x8030_0000).unwrap();
        kernel.processes.yield_now();

        let data = b"x";
        assert_eq!(call(&mut kernel, Syscall::Write as u64, fd, addr(data), 1), SENTINEL);
        assert_eq!(call(&mut kernel, Syscall::Close as u64, fd, 0, 0), SENTINEL);
        assert_eq!(call(&mut kernel, Syscall::Close as u64, 99, 0, 0), SENTINEL);
    }

    #[test]
    fn full_descriptor_table_releases_storage_descriptor() {
        let mut kernel = booted();
        for _ in 0..crate::config::PROC_MAX_FDS {
            assert_ne!(open(&mut kernel, b"/f\0", O_RDONLY | O_CREAT), SENTINEL);
        }
        let before = kernel.files.open_descriptors();
        assert_eq!(open(&mut kernel, b"/f\0", O_RDONLY), SENTINEL);
        assert_eq!(kernel.files.open_descriptors(), before);
    }

    #[test]
    fn exit_then_wait_reports_child_and_status() {
        let mut kernel = booted();
        let child = kernel.processes.create("child", 0x8030_0000).unwrap();
        kernel.processes.yield_now();

        let fd = open(&mut kernel, b"/child.log\0", O_WRONLY | O_CREAT);
        assert_ne!(fd, SENTINEL);
        assert_eq!(call(&mut kernel, Syscall::Exit as u64, 42, 0, 0), 0);
        assert_eq!(kernel.processes.current_pid(), INIT_PID);

        let mut status: i32 = 0;
        let reaped = call(&mut kernel, Syscall::Wait as u64, &mut status as *mut i32 as u64, 0, 0);
        assert_eq!(reaped, child as u64);
        assert_eq!(status, 42);
        assert_eq!(kernel.files.open_descriptors(), 0);
    }

    #[test]
    fn wait_with_null_status_and_no_zombie() {
        let mut kernel = booted();
        kernel.processes.create("child", 0x8030_0000).unwrap();
        assert_eq!(call(&mut kernel, Syscall::Wait as u64, 0, 0, 0), SENTINEL);
        assert_eq!(kernel.processes.get(INIT_PID).unwrap().state, ProcessState::Blocked);
    }

    #[test]
    fn kill_through_syscall() {
        let mut kernel = booted();
        let pid = kernel.processes.create("victim", 0x8030_0000).unwrap();
        assert_eq!(call(&mut kernel, Syscall::Kill as u64, pid as u64, 0, 0), 0);
        assert_eq!(call(&mut kernel, Syscall::Kill as u64, pid as u64, SIGKILL as u64, 0), 0);
        assert_eq!(kernel.processes.get(pid).unwrap().exit_code, 137);
        assert_eq!(call(&mut kernel, Syscall::Kill as u64, 1 << 40, 0, 0), SENTINEL);
    }

    #[test]
    fn putchar_reaches_the_console() {
        let mut kernel = booted();
        assert_eq!(call(&mut kernel, Syscall::PutChar as u64, b'Z' as u64, 0, 0), 0);
        assert!(console::take_output().contains(&b'Z'));
    }
}
