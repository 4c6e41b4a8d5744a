use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("retry policy error: {0}")]
    Policy(#[from] stow_transfer::PolicyError),

    #[error("key generator error: {0}")]
    Key(#[from] stow_crypto::KeyError),
}

pub type SdkResult<T> = Result<T, SdkError>;
