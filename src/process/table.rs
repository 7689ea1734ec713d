// Process table and lifecycle operations for rvos
use alloc::boxed::Box;
use alloc::vec;
use log::{debug, info, warn};

use crate::arch;
use crate::config::{MAX_PROCESSES, STACK_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::process::pcb::{Context, Descriptors, Pid, Process, ProcessState, SlotIndex, INIT_PID};

/// Signal that only probes for existence.
pub const SIG_PROBE: i32 = 0;
/// Unconditional termination.
pub const SIGKILL: i32 = 9;
/// Termination request; handled exactly like SIGKILL.
pub const SIGTERM: i32 = 15;

/// A table position. The stack belongs to the slot, not to the process, so
/// it survives reaping and is handed to whichever process reuses the slot.
#[derive(Default)]
pub(super) struct Slot {
    pub(super) process: Option<Process>,
    stack: Option<Box<[u8]>>,
}

impl Slot {
    /// Stack top for the next occupant, allocating the region on first use.
    fn bind_stack(&mut self) -> u64 {
        let stack = self
            .stack
            .get_or_insert_with(|| vec![0u8; STACK_SIZE].into_boxed_slice());
        let end = stack.as_ptr() as u64 + stack.len() as u64;
        end & !0xf
    }
}

/// A child collected by [`ProcessTable::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub exit_code: i32,
    /// Storage descriptors the child never closed; the caller releases them.
    pub leaked: Descriptors,
}

/// Process counts by state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemStats {
    pub total_processes: usize,
    pub running_processes: usize,
    pub ready_processes: usize,
    pub blocked_processes: usize,
    pub zombie_processes: usize,
    pub free_slots: usize,
    pub current_process: Option<Pid>,
}

/// Fixed-capacity process table plus the "current" pointer.
pub struct ProcessTable {
    pub(super) slots: [Slot; MAX_PROCESSES],
    pub(super) current: Pid,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::default()),
            current: 0,
            next_pid: INIT_PID + 1,
        }
    }

    /// Reset every slot and synthesize the root process in slot 0.
    ///
    /// Runs once at boot, before traps are enabled.
    pub fn init(&mut self) {
        info!("Initializing process table...");
        for slot in self.slots.iter_mut() {
            slot.process = None;
        }
        self.current = 0;
        self.next_pid = INIT_PID + 1;

        let root = Process::new(INIT_PID, 0, "init", ProcessState::Running, Context::zeroed(), arch::ticks());
        self.slots[0].process = Some(root);
        self.current = INIT_PID;
        info!("Init process created (PID {})", INIT_PID);
    }

    /// Create a Ready process that will start at `entry`.
    pub fn create(&mut self, name: &str, entry: u64) -> KernelResult<Pid> {
        let Some(index) = self.slots.iter().position(|slot| slot.process.is_none()) else {
            warn!("create '{}': process table full", name);
            return Err(KernelError::ResourceExhausted);
        };

        let pid = self.next_pid;
        self.next_pid += 1;

        let slot = &mut self.slots[index];
        let stack_top = slot.bind_stack();
        let process = Process::new(
            pid,
            self.current,
            name,
            ProcessState::Ready,
            Context::new(entry, stack_top),
            arch::ticks(),
        );
        info!("Created process '{}' (PID {})", process.name, pid);
        slot.process = Some(process);
        Ok(pid)
    }

    /// pid of the process the scheduler considers current (0 if none).
    pub fn current_pid(&self) -> Pid {
        self.current
    }

    pub fn current(&self) -> Option<&Process> {
        self.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut Process> {
        self.get_mut(self.current)
    }

    /// Live process with this pid; reaped pids never resolve.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slot_of(pid).and_then(|index| self.slots[index].process.as_ref())
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        let index = self.slot_of(pid)?;
        self.slots[index].process.as_mut()
    }

    pub(super) fn slot_of(&self, pid: Pid) -> Option<SlotIndex> {
        if pid == 0 {
            return None;
        }
        self.slots
            .iter()
            .position(|slot| slot.process.as_ref().is_some_and(|p| p.pid == pid))
    }

    /// Stack region owned by the slot currently holding `pid`.
    pub fn stack_of(&self, pid: Pid) -> Option<&[u8]> {
        let index = self.slot_of(pid)?;
        self.slots[index].stack.as_deref()
    }

    /// Terminate the current process and hand the hart to the scheduler.
    ///
    /// Does nothing without a current process. Callers must not assume the
    /// exiting process runs again.
    pub fn exit(&mut self, code: i32) {
        let Some(process) = self.current_mut() else {
            return;
        };
        info!("Process {} ('{}') exiting with code {}", process.pid, process.name, code);
        process.terminate(code);
        let ppid = process.ppid;
        self.wake_parent(ppid);
        self.yield_now();
    }

    /// Reap the first Zombie child in slot order.
    ///
    /// Without one the caller is Blocked and the scheduler runs, and the call
    /// still fails with `NotFound`: a woken parent has to call `wait` again.
    pub fn wait(&mut self, out_status: Option<&mut i32>) -> KernelResult<Reaped> {
        let me = self.current().map(|p| p.pid).ok_or(KernelError::NoCurrentProcess)?;

        let zombie = self.slots.iter().position(|slot| {
            slot.process
                .as_ref()
                .is_some_and(|p| p.ppid == me && p.state == ProcessState::Zombie)
        });

        if let Some(index) = zombie {
            if let Some(child) = self.slots[index].process.take() {
                if let Some(status) = out_status {
                    *status = child.exit_code;
                }
                debug!("Process {} reaped child {} (exit code {})", me, child.pid, child.exit_code);
                return Ok(Reaped {
                    pid: child.pid,
                    exit_code: child.exit_code,
                    leaked: child.fds,
                });
            }
        }

        if let Some(process) = self.current_mut() {
            process.state = ProcessState::Blocked;
        }
        debug!("Process {} blocked waiting for a child", me);
        self.yield_now();
        Err(KernelError::NotFound)
    }

    /// Deliver `sig` to `pid`. Never yields.
    pub fn kill(&mut self, pid: Pid, sig: i32) -> KernelResult<()> {
        info!("[kill] Attempting to send signal {} to PID {}", sig, pid);
        let Some(target) = self.get_mut(pid) else {
            warn!("[kill] Process {} not found", pid);
            return Err(KernelError::NotFound);
        };

        match sig {
            SIG_PROBE => Ok(()),
            SIGKILL | SIGTERM => {
                info!("[kill] Terminating process {} ('{}') with signal {}", pid, target.name, sig);
                target.terminate(128 + sig);
                let ppid = target.ppid;
                self.wake_parent(ppid);
                Ok(())
            }
            _ => {
                warn!("[kill] Signal {} not implemented", sig);
                Err(KernelError::Unimplemented)
            }
        }
    }

    /// Address-space duplication is not supported.
    pub fn fork(&mut self) -> KernelResult<Pid> {
        warn!("[fork] not implemented");
        Err(KernelError::Unimplemented)
    }

    /// Process image replacement is not supported.
    pub fn exec(&mut self, path: &str) -> KernelResult<()> {
        let pid = self.current_pid();
        warn!("[exec] Process {} asked to execute '{}': not implemented", pid, path);
        Err(KernelError::Unimplemented)
    }

    fn wake_parent(&mut self, ppid: Pid) {
        if let Some(parent) = self.get_mut(ppid) {
            if parent.state == ProcessState::Blocked {
                parent.state = ProcessState::Ready;
                debug!("Woke parent {}", ppid);
            }
        }
    }

    /// Live processes as `(pid, name, state)` in slot order.
    pub fn list(&self) -> impl Iterator<Item = (Pid, &str, ProcessState)> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.process.as_ref())
            .map(|p| (p.pid, p.name.as_str(), p.state))
    }

    pub fn stats(&self) -> SystemStats {
        let mut stats = SystemStats {
            current_process: self.current().map(|p| p.pid),
            ..SystemStats::default()
        };
        for slot in self.slots.iter() {
            let Some(process) = slot.process.as_ref() else {
                stats.free_slots += 1;
                continue;
            };
            stats.total_processes += 1;
            match process.state {
                ProcessState::Running => stats.running_processes += 1,
                ProcessState::Ready => stats.ready_processes += 1,
                ProcessState::Blocked => stats.blocked_processes += 1,
                ProcessState::Zombie => stats.zombie_processes += 1,
            }
        }
        stats
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
