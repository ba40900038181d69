use thiserror::Error;

/// Failures while loading engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn file_read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        ConfigError::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_yaml(path: impl Into<String>, message: impl ToString) -> Self {
        ConfigError::InvalidYaml {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
