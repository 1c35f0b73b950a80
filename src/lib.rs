//! # Ostinato — a runtime for a JSFX-dialect effect scripting language
//!
//! Ostinato loads textual effect sources, preprocesses and parses them
//! into sections, compiles the section bodies with an embedded evaluator,
//! and drives the result through a real-time audio/MIDI cycle with
//! host-facing slider parameters, serializable state and preset banks.
//!
//! ## Architecture
//!
//! The umbrella crate coordinates:
//! - **ostinato-lang** — source loading: path resolution, `<? … ?>`
//!   preprocessing, section/header parsing, recursive imports
//! - **ostinato-vm** — the embedded expression evaluator and its
//!   compile/run/peek facade
//! - **ostinato-engine** — sliders, atomic mask bus, MIDI queues and the
//!   per-block processing cycle
//! - **ostinato-preset** — state values, RPL preset banks, persisted
//!   plugin state
//!
//! This crate adds the concurrency fabric on top: a background worker for
//! loads, presets and undo, the hot-swap install protocol, and the
//! [`EffectHost`] facade a plugin wrapper talks to.
//!
//! ## Quick start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let config = Arc::new(Config::new().with_import_root("/path/to/Effects"));
//! let host = EffectHost::new(config);
//!
//! host.load(Path::new("/path/to/Effects/chorus.jsfx"), None)?;
//!
//! host.set_slider_value(0, 0.4, true);
//! host.process_float(&inputs, &mut outputs, frames);
//!
//! for group in 0..SLIDER_GROUPS as u8 {
//!     let refresh = host.fetch_slider_changes(group);
//!     // update the UI for each set bit
//! }
//! ```

mod engine;
mod menu;
mod undo;
mod worker;

pub use engine::{EffectHost, EffectInfo, RetryLoadState, SliderInfo};
pub use menu::{parse_menu, MenuInsn, MenuItemFlags, MenuOpcode};
pub use undo::{UndoHistory, DEFAULT_UNDO_DEPTH};

pub use ostinato_engine as engine_core;
pub use ostinato_lang as lang;
pub use ostinato_preset as preset;
pub use ostinato_vm as vm;

pub use ostinato_engine::{
    slider_group, slider_mask, AudioFileInfo, AudioFormat, AudioReader, CompileOptions, Config,
    Effect, EngineError, LoadOptions, LogLevel, MidiEvent, MidiQueue, PlaybackState, RtStatus,
    SliderBus, SliderCurve, TimeInfo, MAX_CHANNELS, MAX_TRIGGERS, SLIDER_GROUPS,
};
pub use ostinato_lang::{
    LangError, ParseError, ParseErrorKind, SectionKind, SliderShape, MAX_SLIDERS,
};
pub use ostinato_preset::{
    load_bank, save_bank, Bank, BankError, FxState, PersistedState, Preset, SliderValue,
    StateError,
};

/// Convenience prelude for common imports.
pub mod prelude {
    pub use crate::{
        Bank, CompileOptions, Config, Effect, EffectHost, FxState, LoadOptions, MidiEvent,
        PlaybackState, SectionKind, TimeInfo, SLIDER_GROUPS,
    };
    pub use std::path::Path;
    pub use std::sync::Arc;
}
