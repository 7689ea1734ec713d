// Kernel heap for rvos
//
// A static region in .bss handed to `linked_list_allocator`. Host builds keep
// the system allocator, so only the bare-metal target registers this one.
use log::info;

use crate::config::HEAP_SIZE;

#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(target_os = "none")]
#[repr(C, align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

#[cfg(target_os = "none")]
static mut HEAP: HeapRegion = HeapRegion([0; HEAP_SIZE]);

/// Hand the heap region to the allocator. Call once, before anything allocates.
pub fn init_heap() {
    #[cfg(target_os = "none")]
    {
        let start = unsafe { core::ptr::addr_of_mut!(HEAP) as usize };
        // SAFETY: HEAP is used for nothing else and this runs once at boot.
        unsafe { ALLOCATOR.lock().init(start, HEAP_SIZE) };
        info!("Heap initialized at 0x{:x} ({} KiB)", start, HEAP_SIZE / 1024);
    }
    #[cfg(not(target_os = "none"))]
    info!("Heap provided by the host ({} KiB reserved on target)", HEAP_SIZE / 1024);
}
