/// SPIFFS partition that holds the downloaded artifact
use std::ffi::CString;

use anyhow::{anyhow, Result};
use fetch_core::{FsReader, FsStorage, FsWriter, StorageError, StorageSink};
use log::{error, info};

pub const MOUNT_POINT: &str = "/spiffs";

/// `FsStorage` rooted at the SPIFFS mount point, aware of whether the mount succeeded
pub struct SpiffsStorage {
    files: FsStorage,
    mounted: bool,
}

impl SpiffsStorage {
    /// Register the default SPIFFS partition, formatting it if it cannot be mounted.
    ///
    /// A failed mount is logged and reported later by `check`, so the
    /// orchestrator reports it the same way as any other storage failure.
    pub fn mount() -> Self {
        let mounted = match register(MOUNT_POINT) {
            Ok(()) => {
                log_usage();
                true
            }
            Err(e) => {
                error!("SPIFFS mount failed: {:?}", e);
                false
            }
        };
        Self { files: FsStorage::new(MOUNT_POINT), mounted }
    }
}

fn register(base_path: &str) -> Result<()> {
    let base_path = CString::new(base_path)?;
    let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: std::ptr::null(),
        max_files: 5,
        format_if_mount_failed: true,
    };

    // The VFS layer copies the base path during registration
    let result = unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) };
    if result != esp_idf_sys::ESP_OK {
        return Err(anyhow!("esp_vfs_spiffs_register returned {}", result));
    }
    info!("SPIFFS filesystem mounted at {}", MOUNT_POINT);
    Ok(())
}

fn log_usage() {
    let mut total = 0usize;
    let mut used = 0usize;
    let result = unsafe { esp_idf_sys::esp_spiffs_info(std::ptr::null(), &mut total, &mut used) };
    if result == esp_idf_sys::ESP_OK {
        info!("SPIFFS: {} KB used of {} KB", used / 1024, total / 1024);
    }
}

impl StorageSink for SpiffsStorage {
    type Writer = FsWriter;
    type Reader = FsReader;

    fn check(&self) -> Result<(), StorageError> {
        // SPIFFS has no directories, so the mount root cannot be stat'ed like FsStorage does
        if !self.mounted || !unsafe { esp_idf_sys::esp_spiffs_mounted(std::ptr::null()) } {
            return Err(StorageError::Unavailable(format!("{} not mounted", MOUNT_POINT)));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.exists(path)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.files.remove(path)
    }

    fn open_write(&mut self, path: &str) -> Result<FsWriter, StorageError> {
        self.files.open_write(path)
    }

    fn open_read(&self, path: &str) -> Result<FsReader, StorageError> {
        self.files.open_read(path)
    }
}
