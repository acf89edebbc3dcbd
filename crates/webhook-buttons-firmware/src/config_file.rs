use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use webhook_buttons::{ConfigError, ConfigRecord, ConfigStore};

pub const BUTTONS_CONFIG_PATH: &str = "/spiffs/config/buttons.cfg";
pub const WIFI_CONFIG_PATH: &str = "/spiffs/config/wifi.tsv";

/// Config record persisted as one text file.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&mut self) -> Result<ConfigRecord, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => ConfigRecord::from_text(&raw),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ConfigRecord::new()),
            Err(err) => Err(ConfigError::Io(format!(
                "read {}: {}",
                self.path.display(),
                err
            ))),
        }
    }

    fn save(&mut self, record: &ConfigRecord) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            // SPIFFS is flat and rejects mkdir; the write below still succeeds there.
            if let Err(err) = fs::create_dir_all(parent) {
                log::debug!("[CFG] create_dir_all {}: {}", parent.display(), err);
            }
        }
        fs::write(&self.path, record.to_text())
            .map_err(|err| ConfigError::Io(format!("write {}: {}", self.path.display(), err)))
    }
}
