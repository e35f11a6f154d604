//! Where the CLI keeps its configuration and database
//!
//! Both follow platform conventions through `dirs`:
//! - config: `~/.config/anidb-identify/config.toml` (XDG), `%APPDATA%` on Windows
//! - data: `~/.local/share/anidb-identify/anidb-identify.db`
//!
//! When the platform directories cannot be determined everything falls
//! back to `.anidb-identify` in the current directory.

use anidb_identify_core::config::DEFAULT_DATABASE_FILE;
use std::path::PathBuf;

/// Directory name used under both the config and data roots
const APP_DIR: &str = "anidb-identify";

const FALLBACK_DIR: &str = ".anidb-identify";

const CONFIG_FILE: &str = "config.toml";

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DIR))
}

/// Default location of the SQLite database
pub fn database_path() -> PathBuf {
    data_dir().join(DEFAULT_DATABASE_FILE)
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DIR))
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_is_in_data_dir() {
        let db_path = database_path();
        assert!(
            db_path.starts_with(data_dir()),
            "{} should be under {}",
            db_path.display(),
            data_dir().display()
        );
        assert_eq!(
            db_path.file_name().and_then(|n| n.to_str()),
            Some(DEFAULT_DATABASE_FILE)
        );
    }

    #[test]
    fn test_config_path_names_the_app() {
        let path = config_path();
        assert!(path.starts_with(config_dir()));
        assert!(path.to_string_lossy().contains(APP_DIR));
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(CONFIG_FILE));
    }
}
