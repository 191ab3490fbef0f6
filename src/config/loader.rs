//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order,
//! later ones overriding earlier ones:
//!
//! 1. An explicit file, if one was given (it must exist)
//! 2. `<directory>/recver.{toml,yaml,json}`, if present
//! 3. `<directory>/<environment>.{toml,yaml,json}`, if present
//! 4. `RECVER_*` environment variables (`RECVER_BATCH_CAPACITY=500`)

use super::error::{ConfigResult, ConfigurationError};
use super::RecverConfig;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};

const DEFAULT_ENV_PREFIX: &str = "RECVER";
const BASE_FILE_STEM: &str = "recver";

/// Builder that assembles a [`RecverConfig`] from files and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    directory: Option<PathBuf>,
    environment: Option<String>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            directory: None,
            environment: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Load an explicit file before any directory lookups
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Directory searched for the base and environment-specific files
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Use an explicit environment instead of detecting it.
    /// This is useful for testing without modifying global environment variables
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Prefix for environment variable overrides
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("RECVER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> ConfigResult<RecverConfig> {
        let environment = self
            .environment
            .clone()
            .unwrap_or_else(Self::detect_environment);

        let mut builder = config::Config::builder();

        if let Some(file) = &self.file {
            if !file.is_file() {
                return Err(ConfigurationError::config_file_not_found(file.clone()));
            }
            debug!(file = %file.display(), "Adding explicit configuration file");
            builder = builder.add_source(config::File::from(file.as_path()));
        }

        if let Some(directory) = &self.directory {
            debug!(
                directory = %directory.display(),
                environment = %environment,
                "Searching configuration directory"
            );
            builder = builder
                .add_source(config::File::from(directory.join(BASE_FILE_STEM)).required(false))
                .add_source(config::File::from(directory.join(&environment)).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RecverConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            brokers = %config.brokers,
            group_id = %config.group_id,
            batch_capacity = config.batch_capacity,
            "Receiver configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitPolicy;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_base_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "recver.toml",
            r#"
brokers = "localhost:9092"
group_id = "billing"
batch_capacity = 64
"#,
        );

        let config = ConfigLoader::new()
            .with_directory(dir.path())
            .with_environment("test")
            .load()
            .unwrap();

        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.group_id, "billing");
        assert_eq!(config.batch_capacity, 64);
        assert_eq!(config.poll_timeout_ms, 300);
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "recver.toml",
            r#"
brokers = "localhost:9092"
group_id = "billing"
collect_timeout_ms = 500
"#,
        );
        write(
            &dir,
            "test.toml",
            r#"
collect_timeout_ms = 20
commit_policy = "unless_panicked"
"#,
        );

        let config = ConfigLoader::new()
            .with_directory(dir.path())
            .with_environment("test")
            .load()
            .unwrap();

        assert_eq!(config.collect_timeout_ms, 20);
        assert_eq!(config.commit_policy, CommitPolicy::UnlessPanicked);
        assert_eq!(config.group_id, "billing");
    }

    #[test]
    fn test_environment_variables_override_files() {
        let dir = TempDir::new().unwrap();
        let file = write(
            &dir,
            "custom.toml",
            r#"
brokers = "localhost:9092"
group_id = "billing"
"#,
        );

        env::set_var("RECVER_LOADER_TEST_BATCH_CAPACITY", "7");
        let config = ConfigLoader::new()
            .with_file(&file)
            .with_environment("test")
            .with_env_prefix("RECVER_LOADER_TEST")
            .load();
        env::remove_var("RECVER_LOADER_TEST_BATCH_CAPACITY");

        assert_eq!(config.unwrap().batch_capacity, 7);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .with_file("/definitely/not/here/recver.toml")
            .with_environment("test")
            .load();
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "recver.toml",
            r#"
brokers = "localhost:9092"
group_id = "billing"
batch_capacity = 0
"#,
        );

        let result = ConfigLoader::new()
            .with_directory(dir.path())
            .with_environment("test")
            .load();
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }
}
