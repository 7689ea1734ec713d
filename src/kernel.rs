// Global kernel state for rvos
use lazy_static::lazy_static;
use spin::Mutex;

use crate::process::ProcessTable;
use crate::services::file_system_service::FileSystemService;
use crate::trap::{self, TrapFrame};

/// Everything a trap may touch, behind one lock.
///
/// Lock order: take `KERNEL` before `CONSOLE`, never the other way round.
pub struct Kernel {
    pub processes: ProcessTable,
    pub files: FileSystemService,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            processes: ProcessTable::new(),
            files: FileSystemService::new(),
        }
    }

    /// Boot-time setup; runs before traps are enabled.
    pub fn init(&mut self) {
        self.processes.init();
        self.files.init();
    }

    pub fn handle_trap(&mut self, frame: &mut TrapFrame, scause: u64, stval: u64) {
        trap::dispatch(self, frame, scause, stval);
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref KERNEL: Mutex<Kernel> = Mutex::new(Kernel::new());
}
