//! Failures while resolving `serialtx` settings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file is not valid TOML: {0}")]
    Malformed(#[from] toml::de::Error),

    #[error("cannot encode settings as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot write settings file {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A setting holds a value no port or logger can be set up with.
    /// `key` is the dotted TOML path, e.g. `transport.read_buffer_size`.
    #[error("setting `{key}` is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// A `SERIALTX_*` override could not be parsed.
    #[error("{var}={value:?}: {reason}")]
    BadOverride {
        var: String,
        value: String,
        reason: String,
    },

    /// Neither `--device` nor `serial.device` names a port to open.
    #[error("no serial device configured; pass --device or set serial.device")]
    NoDevice,
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
