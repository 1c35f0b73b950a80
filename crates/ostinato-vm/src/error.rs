//! Error types for ostinato-vm.

use thiserror::Error;

/// A compile diagnostic produced while turning section text into a program.
///
/// `line` is 1-based and already offset into the enclosing source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.line, self.message)
    }
}

/// Error type for VM operations.
#[derive(Error, Debug)]
pub enum VmError {
    #[error("syntax error: {0}")]
    Compile(CompileError),

    #[error("section already compiled")]
    SectionRedefined,

    #[error("unknown variable: {0}")]
    UnknownVariable(String),
}

impl From<CompileError> for VmError {
    fn from(e: CompileError) -> Self {
        VmError::Compile(e)
    }
}
