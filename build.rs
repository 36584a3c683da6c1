use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=LIBMPSSE_DIR");

    // Only the FT232H transport needs libMPSSE; the simulated backend links nothing
    if env::var_os("CARGO_FEATURE_FTDI").is_none() {
        return;
    }

    // LIBMPSSE_DIR overrides the shared checkout next to the crate
    let lib_dir = match env::var_os("LIBMPSSE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
            manifest_dir
                .parent()
                .unwrap_or(&manifest_dir)
                .join("FTDI MPSSE")
                .join("build")
                .join("Win32")
                .join("DLL")
        }
    };

    println!("cargo:rustc-link-search=native={}", lib_dir.display());

    // libmpsse depends on FTD2XX, which is loaded at runtime
    println!("cargo:rustc-link-lib=dylib=libmpsse");
    println!("cargo:rerun-if-changed={}", lib_dir.join("libmpsse.dll").display());
}
