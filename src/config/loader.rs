//! Configuration Loader
//!
//! Reads one YAML document holding the base settings plus optional
//! `development` / `test` / `production` sections, and merges the section
//! for the active environment over the base.

use super::error::{ConfigError, ConfigResult};
use super::EngineConfig;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    source: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_file_with_env(path, &environment)
    }

    /// Load configuration with an explicit environment. Useful for testing
    /// without modifying global environment variables.
    pub fn load_from_file_with_env(path: impl AsRef<Path>, environment: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(
            environment = %environment,
            path = %path.display(),
            "Loading engine configuration"
        );

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::file_read_error(path.display().to_string(), e))?;
        let config = Self::parse_with_env(&content, environment, &path.display().to_string())?;

        Ok(Self {
            config,
            environment: environment.to_string(),
            source: path.to_path_buf(),
        })
    }

    /// Parse a YAML document and apply the `environment` override section
    pub fn parse_with_env(
        content: &str,
        environment: &str,
        origin: &str,
    ) -> ConfigResult<EngineConfig> {
        let mut yaml_data: YamlValue = if content.trim().is_empty() {
            YamlValue::Mapping(Default::default())
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::invalid_yaml(origin, e))?
        };

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(environment = %environment, "Applying environment-specific overrides");
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for env in ENVIRONMENTS {
                map.remove(YamlValue::String(env.to_string()));
            }
        }

        let config: EngineConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigError::invalid_yaml(origin, format!("Failed to deserialize configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
max_association_depth: 8
log_sql: false
test:
  log_sql: true
production:
  max_association_depth: 4
"#;

    fn config_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_environment_overrides_merge_over_base() {
        let file = config_file();
        let test = ConfigManager::load_from_file_with_env(file.path(), "test").unwrap();
        assert_eq!(test.config().max_association_depth, 8);
        assert!(test.config().log_sql);
        assert_eq!(test.config().default_page_size, 25);

        let production = ConfigManager::load_from_file_with_env(file.path(), "production").unwrap();
        assert_eq!(production.config().max_association_depth, 4);
        assert!(!production.config().log_sql);
        assert_eq!(production.environment(), "production");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ConfigManager::load_from_file_with_env("/nonexistent/graphload.yaml", "test")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/graphload.yaml"));
    }

    #[test]
    fn test_invalid_yaml_and_values() {
        assert!(matches!(
            ConfigManager::parse_with_env("max_association_depth: [", "test", "inline"),
            Err(ConfigError::InvalidYaml { .. })
        ));
        assert!(matches!(
            ConfigManager::parse_with_env("default_page_size: 0", "test", "inline"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            ConfigManager::parse_with_env("", "test", "inline").unwrap(),
            EngineConfig::default()
        );
    }
}
