use std::env;

fn main() {
    println!("cargo:rerun-if-changed=link.x");
    println!("cargo:rerun-if-changed=src/entry.S");

    // Host builds (cargo doc, clippy on the workspace) must not see the
    // bare-metal memory layout.
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if arch.starts_with("riscv") {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg=-T{manifest_dir}/link.x");
    }
}
