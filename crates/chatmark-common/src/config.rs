use serde::Serialize;
use serde::de::DeserializeOwned;

use std::path::Path;
use std::path::PathBuf;

use crate::error::ConfigError;

/// The trait for loading configuration data.
pub trait Loader<C> {
    /// Loads the configuration data.
    fn load(&self) -> Result<C, ConfigError>;
}

/// The trait for saving configuration data.
pub trait Saver<C> {
    /// Saves the configuration data.
    fn save(&self, config: &C) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// The file extension picks the format: `.json` or `.toml`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> Result<Format, ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }),
        }
    }

    fn read(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, contents: &str) -> Result<(), ConfigError> {
        std::fs::write(&self.path, contents).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl<C: DeserializeOwned> Loader<C> for FileStore {
    fn load(&self) -> Result<C, ConfigError> {
        let format = self.format()?;
        let contents = self.read()?;
        tracing::debug!(path = %self.path.display(), ?format, "loading config");
        match format {
            Format::Json => Ok(serde_json::from_str(&contents)?),
            Format::Toml => Ok(toml::from_str(&contents)?),
        }
    }
}

impl<C: Serialize> Saver<C> for FileStore {
    fn save(&self, config: &C) -> Result<(), ConfigError> {
        let contents = match self.format()? {
            Format::Json => serde_json::to_string_pretty(config)?,
            Format::Toml => toml::to_string_pretty(config)?,
        };
        self.write(&contents)
    }
}
