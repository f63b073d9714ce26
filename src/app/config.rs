//! TOML configuration file
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "text"
//!
//! [executor]
//! max-concurrent-tasks = 32
//!
//! [[container]]
//! destination = "queue://orders"
//! session-mode = "transacted"
//! min-receivers = 1
//! max-receivers = 8
//! ```
//!
//! An explicitly given file must exist. Without one, the default location
//! under the user's config directory is read if present.

use crate::app::args::Args;
use crate::container::api::{ContainerConfig, ContainerError};
use crate::core::error_handling::ContextualError;
use crate::core::logging::{LogFormat, LoggingError, LoggingOptions};
use serde::Deserialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {path}")]
    NotFound { path: String },

    #[error("Error reading configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid container #{index} in {path}: {source}")]
    Container {
        path: String,
        index: usize,
        #[source]
        source: ContainerError,
    },

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ConfigError::Read { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::NotFound { path } => Some(path),
            ConfigError::Parse { message, .. } => Some(message),
            ConfigError::Container { source, .. } => source.user_message(),
            ConfigError::Logging(_) => Some("invalid logging configuration"),
            ConfigError::Read { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
    pub color: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExecutorSection {
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(rename = "container")]
    pub containers: Vec<ContainerConfig>,
    pub logging: LoggingSection,
    pub executor: ExecutorSection,
}

impl FileConfig {
    /// Parse and validate every container entry
    pub fn parse(contents: &str, path: &str) -> Result<Self, ConfigError> {
        let mut config: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        for (index, container) in config.containers.iter_mut().enumerate() {
            container.validate().map_err(|source| ConfigError::Container {
                path: path.to_string(),
                index: index + 1,
                source,
            })?;
        }
        Ok(config)
    }

    /// Single demo queue used when nothing is configured
    pub fn demo() -> Self {
        Self {
            containers: vec![ContainerConfig {
                max_receivers: 4,
                ..ContainerConfig::new("queue://demo")
            }],
            ..Self::default()
        }
    }

    /// Executor size; defaults to the sum of `max-receivers`
    pub fn executor_capacity(&self) -> usize {
        self.executor.max_concurrent_tasks.unwrap_or_else(|| {
            let receivers: usize = self.containers.iter().map(|c| c.max_receivers).sum();
            receivers.max(1)
        })
    }

    /// Logging options with command line values taking precedence
    pub fn logging_options(&self, args: &Args) -> Result<LoggingOptions, ConfigError> {
        let format = args
            .log_format
            .as_deref()
            .or(self.logging.format.as_deref())
            .map(str::parse::<LogFormat>)
            .transpose()?
            .unwrap_or_default();
        let color = args
            .color_choice()
            .or(self.logging.color)
            .unwrap_or_else(|| std::io::stderr().is_terminal());
        Ok(LoggingOptions {
            level: args.log_level.clone().or_else(|| self.logging.level.clone()),
            format,
            file: args.log_file.clone().or_else(|| self.logging.file.clone()),
            color,
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("Brokerpool").join("brokerpool.toml"))
}

/// Load the configuration file, if any
///
/// Returns the path that was read alongside the configuration.
pub async fn load_config(
    explicit: Option<&Path>,
) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            })
        }
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok((FileConfig::default(), None)),
        },
    };

    let display = path.display().to_string();
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
    let config = FileConfig::parse(&contents, &display)?;
    Ok((config, Some(path)))
}
