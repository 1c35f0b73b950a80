//! Slider model, MIDI bus and the audio/MIDI processing engine.
//!
//! [`Effect`] is the central object: it owns the loaded sources, the
//! compiled VM, the 256-entry slider table and the MIDI queues, and runs
//! the per-block processing cycle. The [`SliderBus`] carries the atomic
//! masks and value mirror shared with the host-facing threads.

pub mod bus;
mod config;
mod curve;
mod effect;
mod error;
pub mod midi;
mod slider;
mod transport;

pub use bus::{slider_group, slider_mask, SliderBus, SLIDER_GROUPS};
pub use config::{AudioFileInfo, AudioFormat, AudioReader, Config, LogLevel};
pub use curve::SliderCurve;
pub use effect::{CompileOptions, Effect, LoadOptions, RtStatus};
pub use error::EngineError;
pub use midi::{MidiEvent, MidiQueue, DEFAULT_MIDI_CAPACITY};
pub use slider::{Slider, MAX_SLIDERS};
pub use transport::{PlaybackState, TimeInfo};

/// Upper bound on audio channels per direction.
pub const MAX_CHANNELS: usize = 64;

/// Number of trigger bits accepted by `send_trigger`.
pub const MAX_TRIGGERS: u32 = 10;
