//! Error types for ostinato-engine.

use thiserror::Error;

/// Error type for effect lifecycle operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Lang(#[from] ostinato_lang::LangError),

    #[error("compile failed: {0}")]
    Compile(String),

    #[error("no source is loaded")]
    NotLoaded,
}
