// Sv39 identity map for rvos
//
// Every process shares one address space: the low gigabyte (MMIO) and the
// gigabyte holding RAM are identity mapped with 2 MiB leaves, user
// accessible, so the kernel and every process see the same addresses.
use log::{debug, info};

pub const PTE_V: u64 = 1 << 0;
pub const PTE_R: u64 = 1 << 1;
pub const PTE_W: u64 = 1 << 2;
pub const PTE_X: u64 = 1 << 3;
pub const PTE_U: u64 = 1 << 4;
pub const PTE_A: u64 = 1 << 6;
pub const PTE_D: u64 = 1 << 7;

/// Flags for the 2 MiB leaves of the identity map.
pub const LEAF_FLAGS: u64 = PTE_V | PTE_R | PTE_W | PTE_X | PTE_U | PTE_A | PTE_D;

pub const SATP_MODE_SV39: u64 = 8;

const ENTRIES: usize = 512;
const MEGAPAGE: u64 = 0x20_0000;
const GIGAPAGE: u64 = 0x4000_0000;

const L1_TABLES: usize = 2;

/// Root slots that get an L1 table, and the physical base each one maps.
const MAPPED_GIGAPAGES: [(usize, u64); L1_TABLES] = [(0, 0x0000_0000), (2, 0x8000_0000)];

/// Page table entry for physical address `pa`; the PPN sits in bits 53:10.
pub const fn make_pte(pa: u64, flags: u64) -> u64 {
    ((pa >> 12) << 10) | flags
}

/// `satp` value selecting Sv39 with the root table at `root_pa`.
pub const fn make_satp(root_pa: u64) -> u64 {
    (SATP_MODE_SV39 << 60) | (root_pa >> 12)
}

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
pub struct PageTable(pub [u64; ENTRIES]);

impl PageTable {
    pub const fn empty() -> Self {
        Self([0; ENTRIES])
    }

    fn address(&self) -> u64 {
        self as *const Self as u64
    }
}

/// Root table plus one L1 table per mapped gigabyte.
#[repr(C)]
pub struct PageTables {
    pub root: PageTable,
    pub l1: [PageTable; L1_TABLES],
}

impl PageTables {
    pub const fn empty() -> Self {
        Self {
            root: PageTable::empty(),
            l1: [PageTable::empty(); L1_TABLES],
        }
    }

    /// Fill the tables in place. Non-leaf entries carry only V.
    pub fn build_identity_map(&mut self) {
        self.root.0 = [0; ENTRIES];
        for (table, &(slot, base)) in self.l1.iter_mut().zip(MAPPED_GIGAPAGES.iter()) {
            for (i, entry) in table.0.iter_mut().enumerate() {
                *entry = make_pte(base + i as u64 * MEGAPAGE, LEAF_FLAGS);
            }
            self.root.0[slot] = make_pte(table.address(), PTE_V);
            debug!(
                "L2[{}] -> L1 at 0x{:x} (VA 0x{:x}-0x{:x})",
                slot,
                table.address(),
                base,
                base + GIGAPAGE - 1
            );
        }
    }

    pub fn satp(&self) -> u64 {
        make_satp(self.root.address())
    }
}

#[cfg(all(target_arch = "riscv64", feature = "paging"))]
mod hw {
    use log::{info, warn};

    use super::PageTables;
    use crate::arch;

    static mut TABLES: PageTables = PageTables::empty();

    /// Build the map, install it and flush the TLB.
    pub fn init() {
        // SAFETY: runs once at boot on a single hart, before traps exist.
        let tables = unsafe { &mut *core::ptr::addr_of_mut!(TABLES) };
        tables.build_identity_map();
        let satp = tables.satp();

        info!("Writing SATP = 0x{:x}", satp);
        unsafe {
            core::arch::asm!(
                "csrw satp, {0}",
                "sfence.vma zero, zero",
                in(reg) satp,
                options(nostack),
            );
        }
        arch::permit_user_memory_access();

        let readback = arch::satp_bits() as u64;
        if readback == satp {
            info!("Sv39 paging enabled");
        } else {
            warn!("SATP readback 0x{:x} does not match 0x{:x}", readback, satp);
        }
    }
}

/// Turn on translation, if the kernel was built with it.
pub fn init() {
    info!("Initializing Sv39 paging...");
    #[cfg(all(target_arch = "riscv64", feature = "paging"))]
    hw::init();
}
