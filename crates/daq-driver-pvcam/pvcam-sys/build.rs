use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic if the `pvcam-sdk` feature is enabled.
    // This allows the crate to compile without the SDK if the feature is not active.
    #[cfg(feature = "pvcam-sdk")]
    {
        println!("cargo:rerun-if-env-changed=PVCAM_SDK_DIR");
        println!("cargo:rerun-if-env-changed=PVCAM_LIB_DIR");
        println!("cargo:rerun-if-changed=wrapper.h");

        let sdk_dir = env::var("PVCAM_SDK_DIR").expect(
            "PVCAM_SDK_DIR environment variable must be set when `pvcam-sdk` feature is enabled.",
        );

        let sdk_include_path = PathBuf::from(&sdk_dir).join("include");

        // Allow PVCAM_LIB_DIR to override the default lib path
        let sdk_lib_path = if let Ok(lib_dir) = env::var("PVCAM_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else {
            PathBuf::from(&sdk_dir).join("lib")
        };

        if !sdk_include_path.exists() {
            panic!(
                "PVCAM SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        // Libraries may be installed globally, so only warn.
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: PVCAM SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            // Camera, exposure-sequence and ICL script calls all start with `pl_`
            .allowlist_function("pl_.*")
            .allowlist_type("rs_bool")
            .allowlist_type("uns8|uns16|uns32|uns64")
            .allowlist_type("int8|int16|int32|int64")
            .allowlist_type("flt32|flt64")
            .allowlist_type("char_ptr")
            .allowlist_type("PV_.*")
            // ICL display descriptor filled by pl_exp_display_script
            .allowlist_type("icl_disp_type")
            .default_enum_style(bindgen::EnumVariation::Rust {
                non_exhaustive: false,
            })
            .allowlist_var("READOUT_.*")
            .allowlist_var("EXPOSURE_IN_PROGRESS")
            .allowlist_var("ACQUISITION_IN_PROGRESS")
            .allowlist_var("CCS_.*")
            .allowlist_var("CAM_NAME_LEN")
            .allowlist_var("ERROR_MSG_LEN")
            .generate()
            .expect("Unable to generate bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

        #[cfg(target_os = "windows")]
        {
            println!("cargo:rustc-link-lib=pvcam64");
        }
        #[cfg(target_os = "macos")]
        {
            println!("cargo:rustc-link-lib=pvcam");
        }
        #[cfg(target_os = "linux")]
        {
            println!("cargo:rustc-link-lib=pvcam");
        }
    }
    #[cfg(not(feature = "pvcam-sdk"))]
    {
        // Without the SDK, emit an empty module so dependents still build.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when pvcam-sdk feature is not enabled\npub mod pvcam_bindings {}\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
