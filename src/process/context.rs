// Context switching for rvos
//
// The scheduler moves the Running state between processes; this is where the
// registers follow it. After a trap has been handled the frame on the trap
// stack still belongs to the process that trapped. If the handler changed the
// current pid, that frame is stored into the outgoing process and the incoming
// process's saved context is loaded in its place, so `sret` resumes the new
// owner of the hart.
use log::{debug, warn};

use crate::process::pcb::{Context, Pid};
use crate::process::table::ProcessTable;
use crate::trap::TrapFrame;

impl Context {
    /// Snapshot a trapped process.
    pub fn save(&mut self, frame: &TrapFrame) {
        self.regs = frame.regs;
        self.regs[0] = 0;
        self.pc = frame.sepc;
    }

    /// Overwrite `frame` so returning from the trap resumes this context.
    pub fn restore(&self, frame: &mut TrapFrame) {
        frame.regs = self.regs;
        frame.regs[0] = 0;
        frame.sepc = self.pc;
    }
}

/// Save-then-restore step at the trap boundary.
///
/// `from` is the pid that was current when the trap was taken. Returns true
/// when the frame now belongs to a different process.
pub fn switch_frame(table: &mut ProcessTable, from: Pid, frame: &mut TrapFrame) -> bool {
    let to = table.current_pid();
    if to == from {
        return false;
    }

    // The outgoing process may already be gone if it was reaped in this trap.
    if let Some(outgoing) = table.get_mut(from) {
        outgoing.context.save(frame);
    }

    match table.get(to) {
        Some(incoming) => {
            incoming.context.restore(frame);
            debug!("Context switch: PID {} -> PID {} (pc 0x{:x})", from, to, frame.sepc);
            true
        }
        None => {
            warn!("Context switch: PID {} has no process record", to);
            false
        }
    }
}
