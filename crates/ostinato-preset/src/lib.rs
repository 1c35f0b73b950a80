//! State and preset-bank codecs for the ostinato runtime.
//!
//! [`FxState`] is the value sufficient to restore a compiled effect:
//! slider values plus the opaque `@serialize` blob. [`Bank`] is an ordered,
//! immutable collection of named states read and written in the RPL
//! preset-library text format.

pub mod base64;
mod error;
mod persist;
mod rpl;
mod state;

pub use error::{BankError, StateError};
pub use persist::{PersistedState, PERSIST_TYPE_TAG, PERSIST_VERSION};
pub use rpl::{load_bank, save_bank, Bank, Preset};
pub use state::{FxState, SliderValue};
