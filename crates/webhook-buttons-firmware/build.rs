use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let manifest_dir = PathBuf::from(manifest_dir);
    let sdkconfig_defaults = manifest_dir.join("sdkconfig.defaults");

    println!("cargo:rerun-if-changed=sdkconfig.defaults");
    println!("cargo:rerun-if-changed=partitions.csv");

    if env::var("ESP_IDF_SDKCONFIG_DEFAULTS").is_err() {
        eprintln!("WARNING: ESP_IDF_SDKCONFIG_DEFAULTS not set! SPIFFS partition table may be missing.");
        eprintln!("Build with: export ESP_IDF_SDKCONFIG_DEFAULTS=crates/webhook-buttons-firmware/sdkconfig.defaults");
    }

    // A cached sdkconfig older than the defaults file would silently win.
    if let Ok(entries) = fs::read_dir(manifest_dir.join("target")) {
        for entry in entries.flatten() {
            let build_dir = entry.path().join("build");
            let Ok(build_entries) = fs::read_dir(&build_dir) else {
                continue;
            };
            for build_entry in build_entries.flatten() {
                let build_path = build_entry.path();
                if build_path.to_string_lossy().contains("esp-idf-sys") {
                    invalidate_stale_sdkconfig(&build_path, &sdkconfig_defaults);
                }
            }
        }
    }

    embuild::espidf::sysenv::output();
}

fn invalidate_stale_sdkconfig(build_path: &Path, defaults: &Path) {
    let sdkconfig = build_path.join("out/esp-idf/sdkconfig");
    let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();
    if let (Some(sdk_time), Some(defaults_time)) = (modified(&sdkconfig), modified(defaults)) {
        if defaults_time > sdk_time {
            eprintln!("sdkconfig.defaults changed! Forcing regeneration...");
            let _ = fs::remove_file(&sdkconfig);
            let _ = fs::remove_dir_all(build_path.join("out/esp-idf/sdkconfig.d"));
        }
    }
}
