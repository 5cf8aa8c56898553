use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=CUPTI_LIB_DIR");
    println!("cargo:rerun-if-env-changed=CUDA_HOME");

    if env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }

    let lib_dir = match env::var_os("CUPTI_LIB_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let cuda_home = env::var_os("CUDA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/local/cuda"));
            cuda_home.join("extras").join("CUPTI").join("lib64")
        }
    };

    if !lib_dir.exists() {
        println!(
            "cargo:warning=CUPTI library directory {} not found; set CUPTI_LIB_DIR",
            lib_dir.display()
        );
    }
    println!("cargo:rustc-link-search=native={}", lib_dir.display());
}
