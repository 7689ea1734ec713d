// Process Control Block (PCB) for rvos
use core::fmt;

use crate::config::{PROC_MAX_FDS, PROC_NAME_LEN};

/// Process ID type. Zero never names a live process; it is the root's ppid.
pub type Pid = u32;

/// pid the table assigns to the root process at boot.
pub const INIT_PID: Pid = 1;

/// Index of a slot in the process table.
pub type SlotIndex = usize;

/// Process state enumeration
///
/// An Unused slot holds no `Process` at all, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running, // Currently owns the hart
    Ready,   // Runnable, waiting for the scheduler
    Blocked, // Waiting for a child to terminate
    Zombie,  // Terminated, exit code not yet collected
}

/// Register snapshot a process resumes from.
///
/// `regs` follows the RISC-V numbering, so `regs[2]` is the stack pointer
/// and `regs[10]` is `a0`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub regs: [u64; 32],
    pub pc: u64,
}

impl Context {
    pub const SP: usize = 2;

    pub const fn zeroed() -> Self {
        Self { regs: [0; 32], pc: 0 }
    }

    /// Context that starts executing at `entry` on a stack ending at `stack_top`.
    pub fn new(entry: u64, stack_top: u64) -> Self {
        let mut context = Self::zeroed();
        context.pc = entry;
        context.regs[Self::SP] = stack_top;
        context
    }

    pub fn sp(&self) -> u64 {
        self.regs[Self::SP]
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("pc", &format_args!("0x{:x}", self.pc))
            .field("sp", &format_args!("0x{:x}", self.sp()))
            .finish()
    }
}

/// Fixed-capacity process name; the last byte is always NUL.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcessName([u8; PROC_NAME_LEN]);

impl ProcessName {
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; PROC_NAME_LEN];
        // Cut on a char boundary so `as_str` never sees a split code point.
        let mut len = name.len().min(PROC_NAME_LEN - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(PROC_NAME_LEN);
        core::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl fmt::Debug for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-process descriptor table: process-local fd -> storage descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptors([Option<usize>; PROC_MAX_FDS]);

impl Descriptors {
    pub const fn unset() -> Self {
        Self([None; PROC_MAX_FDS])
    }

    /// Bind `storage_fd` to the lowest free local fd.
    pub fn install(&mut self, storage_fd: usize) -> Option<usize> {
        let local = self.0.iter().position(Option::is_none)?;
        self.0[local] = Some(storage_fd);
        Some(local)
    }

    pub fn lookup(&self, local: usize) -> Option<usize> {
        self.0.get(local).copied().flatten()
    }

    pub fn release(&mut self, local: usize) -> Option<usize> {
        self.0.get_mut(local).and_then(Option::take)
    }

    /// Storage descriptors still bound, in local-fd order.
    pub fn open(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().filter_map(|fd| *fd)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Process Control Block
#[derive(Debug)]
pub struct Process {
    pub pid: Pid,
    pub ppid: Pid,
    pub state: ProcessState,
    pub name: ProcessName,
    pub context: Context,
    /// Only meaningful once the process is a Zombie.
    pub exit_code: i32,
    pub fds: Descriptors,
    /// Tick at which the process was created.
    pub start_time: u64,
    /// Ticks spent Running.
    pub cpu_time: u64,
    scheduled_at: u64,
}

impl Process {
    pub fn new(pid: Pid, ppid: Pid, name: &str, state: ProcessState, context: Context, now: u64) -> Self {
        Self {
            pid,
            ppid,
            state,
            name: ProcessName::new(name),
            context,
            exit_code: 0,
            fds: Descriptors::unset(),
            start_time: now,
            cpu_time: 0,
            scheduled_at: now,
        }
    }

    /// Mark the process Running and start its accounting interval.
    pub(super) fn run(&mut self, now: u64) {
        self.state = ProcessState::Running;
        self.scheduled_at = now;
    }

    /// Close the current accounting interval.
    pub(super) fn charge(&mut self, now: u64) {
        self.cpu_time += now.saturating_sub(self.scheduled_at);
        self.scheduled_at = now;
    }

    /// Move to Zombie with `code`.
    pub(super) fn terminate(&mut self, code: i32) {
        self.state = ProcessState::Zombie;
        self.exit_code = code;
    }
}
