//! Effect state value type.

use serde::{Deserialize, Serialize};

/// One saved slider value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderValue {
    /// 0-based slider index.
    pub index: u32,
    pub value: f64,
}

/// Everything needed to restore a compiled effect: slider values in
/// ascending index order plus the opaque `@serialize` blob.
///
/// Equality is deep: same ordered slider pairs and byte-equal blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FxState {
    pub sliders: Vec<SliderValue>,
    pub data: Vec<u8>,
}

impl FxState {
    /// Value for `index`, if this state carries one.
    pub fn slider(&self, index: u32) -> Option<f64> {
        self.sliders
            .iter()
            .find(|s| s.index == index)
            .map(|s| s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_equality() {
        let a = FxState {
            sliders: vec![SliderValue { index: 0, value: 1.0 }],
            data: vec![1, 2, 3],
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.data[0] = 9;
        assert_ne!(a, b);
        let mut c = a.clone();
        c.sliders[0].value = 2.0;
        assert_ne!(a, c);
    }

    #[test]
    fn test_slider_lookup() {
        let state = FxState {
            sliders: vec![
                SliderValue { index: 0, value: 1.0 },
                SliderValue { index: 3, value: 2.0 },
            ],
            data: Vec::new(),
        };
        assert_eq!(state.slider(3), Some(2.0));
        assert_eq!(state.slider(1), None);
    }
}
