use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    /// Replace same-named files in the destination during an updated-files backup.
    pub overwrite_updated_files: bool,
    /// Default recursion offered when a folder is added without an explicit choice.
    pub include_all_subfolders: bool,
    pub poll_interval_secs: u64,
    pub lock_wait_millis: u64,
    pub backup_workers: usize,
    pub notify_enabled: bool,
    pub notify_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "filewarden.db".to_string(),
            overwrite_updated_files: false,
            include_all_subfolders: true,
            poll_interval_secs: 300,
            lock_wait_millis: 2000,
            backup_workers: 4,
            notify_enabled: true,
            notify_addr: "127.0.0.1:9713".to_string(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_workers == 0 {
            return Err(ConfigError::Message(
                "backup_workers must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load `Filewarden.toml` (optional) overlaid with `FILEWARDEN_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Filewarden").required(false))
        .add_source(Environment::with_prefix("FILEWARDEN"))
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert!(!config.overwrite_updated_files);
        assert!(config.include_all_subfolders);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(
                "overwrite_updated_files = true\nbackup_workers = 8",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<AppConfig>()
            .unwrap();
        assert!(config.overwrite_updated_files);
        assert_eq!(config.backup_workers, 8);
        assert_eq!(config.db_path, "filewarden.db");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = AppConfig {
            backup_workers: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
