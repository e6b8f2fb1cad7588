use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found: {}\n\
        Set RECONFLOW_CONFIG_PATH or pass --config with an existing file",
        .0.display()
    )]
    ConfigFileNotFound(PathBuf),

    #[error("API token not set: environment variable {0} is empty")]
    MissingToken(String),

    #[error("Invalid config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
