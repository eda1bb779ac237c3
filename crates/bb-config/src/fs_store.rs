// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `ConfigStore` (uses the platform config dir).

use crate::store::{ConfigError, ConfigStore};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Store configs as JSON files under the platform config directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory (e.g., `~/.config/blackboard`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "blackboard", "blackboard")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        let base = proj.config_dir().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Create a store rooted at an explicit directory (used by tests and by the
    /// demonstration driver's `--config` override).
    pub fn at(base: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let filename = format!("{key}.json");
        self.base.join(filename)
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let path = self.path_for(key);
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConfigService;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path().to_path_buf()).unwrap();
        let service = ConfigService::new(store);
        service.save("engine", &"hello".to_string()).unwrap();
        let loaded: Option<String> = service.load("engine").unwrap();
        assert_eq!(loaded, Some("hello".to_string()));
    }

    #[test]
    fn missing_key_is_not_found_not_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path().to_path_buf()).unwrap();
        let err = store.load_raw("nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }
}
