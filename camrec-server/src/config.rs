//! Project directories and the recorder settings file.
//!
//! Settings live in `<config dir>/camrec/config.json`, e.g.
//! `~/.config/camrec/config.json` on Linux. Missing keys take their
//! defaults; a missing file means all defaults.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use camrec_core::RecorderConfig;
use directories::ProjectDirs;
use log::{debug, info};

use crate::ServerError;

const CONFIG_FILE: &str = "config.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "camrec", "camrec")
}

/// Default settings file location.
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Default storage root: the user's data directory, or `./camrec-data`.
pub fn default_storage_root() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.data_dir().to_owned())
        .unwrap_or_else(|| PathBuf::from("./camrec-data"))
}

/// Read settings from `path`.
pub fn load_config_file(path: &Path) -> Result<RecorderConfig, ServerError> {
    let file = File::open(path).map_err(|e| ServerError::Config {
        path: path.to_owned(),
        message: e.to_string(),
    })?;
    let config = serde_json::from_reader(BufReader::new(file)).map_err(|e| ServerError::Config {
        path: path.to_owned(),
        message: e.to_string(),
    })?;
    info!("Loaded settings from {}", path.display());
    Ok(config)
}

/// Settings from an explicit file (which must exist) or from the default
/// location (optional).
pub fn load_config(explicit: Option<&Path>) -> Result<RecorderConfig, ServerError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        Some(path) => {
            debug!("No settings file at {}, using defaults", path.display());
            Ok(RecorderConfig::default())
        }
        None => Ok(RecorderConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"maxFps": 5, "recordingsDir": "/clips"}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_fps, 5);
        assert_eq!(config.recordings_dir, "/clips");
        assert_eq!(config.max_duration_seconds, 300);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        assert!(matches!(
            load_config(Some(&path)),
            Err(ServerError::Config { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_config_file(&path).is_err());
    }
}
