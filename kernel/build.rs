use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let linker_script = manifest_dir.join("linker.ld");
    println!("cargo::rerun-if-changed={}", linker_script.display());
    println!("cargo::rustc-link-arg-bin=kernel=-T{}", linker_script.display());
    println!("cargo::rustc-link-arg-bin=kernel=-no-pie");
}
