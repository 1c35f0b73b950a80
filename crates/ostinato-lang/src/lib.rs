//! Source loading, preprocessing and parsing for the ostinato runtime.
//!
//! The pipeline is: resolve a path ([`fs`]), expand `<? … ?>` spans
//! ([`preprocess`]), split into sections and parse the header
//! ([`parse`]), then pull in imports recursively ([`loader`]).

mod error;
pub mod fs;
pub mod loader;
pub mod parse;
pub mod preprocess;
mod source;

pub use error::{LangError, ParseError, ParseErrorKind};
pub use loader::{expand_program_to_dir, LoadOptions, LoadedProgram, Loader};
pub use source::{
    ConfigItem, Header, HeaderOptions, Section, SectionKind, SliderDecl, SliderShape, SourceUnit,
    Toplevel, MAX_CHANNELS, MAX_SLIDERS,
};
