use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic if the `timeharp-sdk` feature is enabled.
    #[cfg(feature = "timeharp-sdk")]
    {
        println!("cargo:rerun-if-env-changed=TIMEHARP_SDK_DIR");
        println!("cargo:rerun-if-env-changed=TIMEHARP_LIB_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = env::var("TIMEHARP_SDK_DIR").expect(
            "TIMEHARP_SDK_DIR environment variable must be set when `timeharp-sdk` feature is enabled.",
        );
        let sdk_dir = PathBuf::from(sdk_dir);

        // The vendor ships headers and import library side by side.
        let sdk_lib_path = env::var("TIMEHARP_LIB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| sdk_dir.clone());

        if !sdk_dir.join("thlib.h").exists() {
            panic!("thlib.h not found in TIMEHARP_SDK_DIR: {:?}", sdk_dir);
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_dir.display()))
            .allowlist_function("TH_.*")
            .generate()
            .expect("Unable to generate bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());
        println!("cargo:rustc-link-lib=thlib");
    }
    #[cfg(not(feature = "timeharp-sdk"))]
    {
        // Without the library, emit an empty module so dependents still build.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when timeharp-sdk feature is not enabled\npub mod timeharp_bindings {}\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
