fn main() {
    let target = std::env::var("TARGET").unwrap_or_default();
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_default();

    // Host builds (`cargo test`) must not see the kernel linker script.
    if !target.starts_with("riscv64") || !target.ends_with("-none-elf") {
        return;
    }

    let linker_script = format!("{}/linker/riscv64.ld", manifest_dir);
    println!("cargo:rustc-link-arg-bins=-T{}", linker_script);
    println!("cargo:rerun-if-changed={}", linker_script);
    println!("cargo:rerun-if-changed=build.rs");
}
