#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod boot {
    use core::panic::PanicInfo;
    use log::{error, info};
    use rvos::{arch, println};

    // OpenSBI jumps here in S-mode with the hart id in a0.
    core::arch::global_asm!(
        ".section .text.entry",
        ".global _start",
        "_start:",
        "    la   sp, __boot_stack_top",
        "    la   t0, __bss_start",
        "    la   t1, __bss_end",
        "1:  bgeu t0, t1, 2f",
        "    sd   zero, (t0)",
        "    addi t0, t0, 8",
        "    j    1b",
        "2:  call kmain",
        "3:  wfi",
        "    j    3b",
    );

    const BANNER: &str = r#"
                 ____   __     __  ___    ____
                |  _ \  \ \   / / / _ \  / ___|
                | |_) |  \ \ / / | | | | \___ \
                |  _ <    \ V /  | |_| |  ___) |
                |_| \_\    \_/    \___/  |____/
"#;

    #[no_mangle]
    extern "C" fn kmain() -> ! {
        if rvos::console::init_logger().is_err() {
            println!("logger already installed");
        }
        println!("{}", BANNER);
        info!("sstatus: 0x{:x}", arch::sstatus_bits());
        info!("satp (before): 0x{:x}", arch::satp_bits());

        rvos::init();

        info!("Kernel initialization complete!");
        info!("Entering idle loop...");
        rvos::idle_loop()
    }

    /// This function is called on panic.
    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        error!("{}", info);
        rvos::idle_loop()
    }
}

// Host builds only need something to link; the kernel runs under QEMU.
#[cfg(not(target_os = "none"))]
fn main() {}
