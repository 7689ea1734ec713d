// Process Management Module for rvos
pub mod context;
pub mod pcb;
pub mod scheduler;
pub mod table;

pub use context::switch_frame;
pub use pcb::{Context, Descriptors, Pid, Process, ProcessName, ProcessState, SlotIndex, INIT_PID};
pub use table::{ProcessTable, Reaped, SystemStats, SIGKILL, SIGTERM, SIG_PROBE};
