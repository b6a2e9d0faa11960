//! Configuration persistence and atomic write helpers

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::RuntimeConfig;
use super::error::ConfigResult;

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> ConfigResult<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    // Sync parent directory
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new().read(true).open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}

/// Write runtime configuration as pretty JSON
pub fn write_config(path: &Path, config: &RuntimeConfig) -> ConfigResult<()> {
    let json = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &json)
}

/// Load runtime configuration
pub fn load_config(path: &Path) -> ConfigResult<RuntimeConfig> {
    let data = fs::read(path)?;
    let config = serde_json::from_slice(&data)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::ConfigError;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("questd.json");

        let config = RuntimeConfig {
            dedup_requests: true,
            debug: true,
        };

        write_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);

        let relaxed = RuntimeConfig::default();
        relaxed.save(&path).unwrap();
        let loaded = RuntimeConfig::load(&path).unwrap();

        assert_eq!(loaded, relaxed);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.json");
        fs::write(&path, br#"{"dedup_requests": true}"#).unwrap();

        let loaded = load_config(&path).unwrap();
        assert!(loaded.dedup_requests);
        assert!(!loaded.debug);
    }

    #[test]
    fn test_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, b"{not json").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_config(&temp.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
