//! Error types for ostinato-preset.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for preset-bank reading and writing.
#[derive(Error, Debug)]
pub enum BankError {
    #[error("cannot access bank file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a preset library")]
    NotAPresetLibrary,

    #[error("malformed preset library: {0}")]
    Malformed(String),
}

/// Error type for persisted-state decoding.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("malformed persisted state: {0}")]
    Malformed(String),

    #[error("unsupported persisted state version {0}")]
    UnsupportedVersion(u32),

    #[error("persisted state has the wrong type tag `{0}`")]
    WrongType(String),
}
