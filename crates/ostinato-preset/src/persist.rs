//! Host-persisted plugin state.
//!
//! When a host wraps the runtime, it persists a small key/value tree:
//! a type tag, a format version, the absolute source path and the state
//! itself (slider map + base64 data). Encoded as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::base64;
use crate::error::StateError;
use crate::state::{FxState, SliderValue};

pub const PERSIST_TYPE_TAG: &str = "ostinato";
pub const PERSIST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedDoc {
    #[serde(rename = "type")]
    type_tag: String,
    version: u32,
    path: String,
    state: PersistedStateNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedStateNode {
    sliders: BTreeMap<u32, f64>,
    data: String,
}

/// The source path and state of a wrapped effect instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub path: String,
    pub state: FxState,
}

impl PersistedState {
    pub fn to_json(&self) -> String {
        let doc = PersistedDoc {
            type_tag: PERSIST_TYPE_TAG.to_string(),
            version: PERSIST_VERSION,
            path: self.path.clone(),
            state: PersistedStateNode {
                sliders: self
                    .state
                    .sliders
                    .iter()
                    .map(|s| (s.index, s.value))
                    .collect(),
                data: base64::encode(&self.state.data),
            },
        };
        serde_json::to_string(&doc).expect("persisted state serializes")
    }

    pub fn from_json(text: &str) -> Result<PersistedState, StateError> {
        let doc: PersistedDoc =
            serde_json::from_str(text).map_err(|e| StateError::Malformed(e.to_string()))?;
        if doc.type_tag != PERSIST_TYPE_TAG {
            return Err(StateError::WrongType(doc.type_tag));
        }
        if doc.version != PERSIST_VERSION {
            return Err(StateError::UnsupportedVersion(doc.version));
        }
        Ok(PersistedState {
            path: doc.path,
            state: FxState {
                sliders: doc
                    .state
                    .sliders
                    .iter()
                    .map(|(&index, &value)| SliderValue { index, value })
                    .collect(),
                data: base64::decode(&doc.state.data),
            },
        })
    }
}
