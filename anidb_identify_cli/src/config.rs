//! Layered configuration
//!
//! Priority, lowest first:
//! 1. built-in defaults, with the database under the platform data dir
//! 2. `config.toml` under the platform config dir
//! 3. `ANIDB_` environment variables, `__` separating sections
//!    (`ANIDB_PROTOCOL__USERNAME`, `ANIDB_HASHER__MAX_THREADS`)
//! 4. command line flags

use crate::paths;
use anidb_identify_core::PipelineConfig;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Prefix of every environment variable read into the configuration
pub const ENV_PREFIX: &str = "ANIDB_";

/// Flags that override whatever the file and environment say
///
/// Unset fields are skipped when serialized, so they never mask a lower
/// layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CliOverrides {
    pub protocol: ProtocolOverrides,
    pub hasher: HasherOverrides,
    pub storage: StorageOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtocolOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HasherOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialize_io: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

/// Defaults for this front end: the core's, with the database moved into
/// the platform data directory
pub fn default_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.database_path = paths::database_path();
    config
}

/// Loads [`PipelineConfig`] from the layers above
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: paths::config_path(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn figment(&self, overrides: &CliOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(default_config()));
        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
    }

    /// Merge every layer and validate the result
    pub fn load(&self, overrides: &CliOverrides) -> Result<PipelineConfig> {
        let config: PipelineConfig = self
            .figment(overrides)
            .extract()
            .with_context(|| {
                format!(
                    "Failed to load configuration (file: {})",
                    self.config_path.display()
                )
            })?;
        config.validate().context("Invalid configuration")?;
        log::debug!("Loaded configuration: {config:?}");
        Ok(config)
    }
}

/// Effective configuration as TOML with the password masked
pub fn render(config: &PipelineConfig) -> Result<String> {
    let mut shown = config.clone();
    if !shown.protocol.password.is_empty() {
        shown.protocol.password = "***".to_string();
    }
    toml::to_string_pretty(&shown).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_put_database_in_data_dir() {
        Jail::expect_with(|jail| {
            let loader = ConfigLoader::with_path(jail.directory().join("missing.toml"));
            let config = loader.load(&CliOverrides::default()).map_err(|e| e.to_string())?;
            assert_eq!(config.storage.database_path, paths::database_path());
            assert_eq!(config.protocol.port, 9000);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_file_then_env_then_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [protocol]
                username = "from-file"
                port = 9100

                [hasher]
                max_threads = 2
                "#,
            )?;
            jail.set_env("ANIDB_PROTOCOL__USERNAME", "from-env");
            jail.set_env("ANIDB_HASHER__SERIALIZE_IO", "true");

            let loader = ConfigLoader::with_path(jail.directory().join("config.toml"));
            let config = loader.load(&CliOverrides::default()).map_err(|e| e.to_string())?;
            assert_eq!(config.protocol.username, "from-env");
            assert_eq!(config.protocol.port, 9100);
            assert_eq!(config.hasher.max_threads, 2);
            assert!(config.hasher.serialize_io);

            let overrides = CliOverrides {
                hasher: HasherOverrides {
                    max_threads: Some(6),
                    serialize_io: None,
                },
                storage: StorageOverrides {
                    database_path: Some(PathBuf::from("elsewhere.db")),
                },
                ..Default::default()
            };
            let config = loader.load(&overrides).map_err(|e| e.to_string())?;
            assert_eq!(config.hasher.max_threads, 6);
            assert!(config.hasher.serialize_io, "unset flag must not mask env");
            assert_eq!(config.storage.database_path, PathBuf::from("elsewhere.db"));
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[protocol]\nport = 0\n")?;
            let loader = ConfigLoader::with_path(jail.directory().join("config.toml"));
            assert!(loader.load(&CliOverrides::default()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_render_masks_password() {
        let mut config = default_config();
        config.protocol.password = "hunter2".to_string();
        let rendered = render(&config).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
        assert!(rendered.contains("[hasher]"));
    }
}
