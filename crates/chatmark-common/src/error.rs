use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or saving configuration files.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to access config file {}", path.display())]
    #[diagnostic(code(chatmark::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(chatmark::config::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(chatmark::config::toml_read))]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(code(chatmark::config::toml_write))]
    TomlWrite(#[from] toml::ser::Error),

    #[error("unsupported config format: {}", path.display())]
    #[diagnostic(
        code(chatmark::config::unsupported_format),
        help("use a .json or .toml file")
    )]
    UnsupportedFormat { path: PathBuf },
}
