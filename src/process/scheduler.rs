// Cooperative round-robin scheduler for rvos
//
// The scheduler only decides which process owns the Running state. Registers
// move at the trap boundary (see `context::switch_frame`).
use log::debug;

use crate::arch;
use crate::config::MAX_PROCESSES;
use crate::process::pcb::{Pid, ProcessState};
use crate::process::table::ProcessTable;

impl ProcessTable {
    /// Give up the Running state.
    ///
    /// The current process is demoted to Ready, then slots are scanned from
    /// the one after it, wrapping once; the first Ready process found runs.
    /// If nothing else is Ready the yielding process keeps running. Returns
    /// the pid that is current afterwards.
    pub fn yield_now(&mut self) -> Pid {
        let now = arch::ticks();
        let origin = self.slot_of(self.current);

        if let Some(process) = origin.and_then(|index| self.slots[index].process.as_mut()) {
            process.charge(now);
            if process.state == ProcessState::Running {
                process.state = ProcessState::Ready;
            }
        }

        // Without a current process, start the scan at slot 0.
        let start = origin.unwrap_or(MAX_PROCESSES - 1);
        for step in 1..MAX_PROCESSES {
            let index = (start + step) % MAX_PROCESSES;
            if let Some(process) = self.slots[index].process.as_mut() {
                if process.state == ProcessState::Ready {
                    process.run(now);
                    debug!("Scheduler: PID {} -> PID {}", self.current, process.pid);
                    self.current = process.pid;
                    return self.current;
                }
            }
        }

        if let Some(process) = origin.and_then(|index| self.slots[index].process.as_mut()) {
            if process.state == ProcessState::Ready {
                process.run(now);
            }
        }
        self.current
    }
}
