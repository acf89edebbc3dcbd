//! SPIFFS mount holding the persisted configuration files.

use std::ffi::CString;

use esp_idf_svc::sys;

pub const SPIFFS_MOUNT_POINT: &str = "/spiffs";
const SPIFFS_MAX_FILES: usize = 4;

/// Register the default `spiffs` partition at [`SPIFFS_MOUNT_POINT`],
/// formatting it on first boot.
pub fn mount() -> Result<(), String> {
    let base_path =
        CString::new(SPIFFS_MOUNT_POINT).map_err(|_| String::from("Invalid mount path"))?;
    let conf = sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: SPIFFS_MAX_FILES,
        format_if_mount_failed: true,
    };

    let res = unsafe { sys::esp_vfs_spiffs_register(&conf) };
    if res != sys::ESP_OK {
        return Err(format!("SPIFFS mount failed: {}", res));
    }

    let mut total = 0usize;
    let mut used = 0usize;
    let res = unsafe { sys::esp_spiffs_info(core::ptr::null(), &mut total, &mut used) };
    if res == sys::ESP_OK {
        log::info!(
            "[CFG] SPIFFS mounted at {} ({}/{} bytes used)",
            SPIFFS_MOUNT_POINT,
            used,
            total
        );
    } else {
        log::info!("[CFG] SPIFFS mounted at {}", SPIFFS_MOUNT_POINT);
    }
    Ok(())
}
