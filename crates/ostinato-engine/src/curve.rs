//! Normalized ↔ slider-value transforms.
//!
//! Three shapes: linear, log (three-point exponential through a center)
//! and sqr (power law). Each has two mappings: the **automation** variant
//! warps the normalized axis so a host automation ramp sweeps the value
//! range evenly, while the **raw** variant is what the on-screen value of
//! a range spanning zero uses (zero pinned at 0.5).

use ostinato_lang::SliderShape;

const EPS_MODIFIER: f64 = 1e-4;
const EPS_RANGE: f64 = 1e-12;

/// Range and shape of one slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderCurve {
    pub def: f64,
    pub min: f64,
    pub max: f64,
    pub inc: f64,
    pub shape: SliderShape,
    /// Center for log, exponent for sqr.
    pub modifier: f64,
}

impl Default for SliderCurve {
    fn default() -> Self {
        SliderCurve {
            def: 0.0,
            min: 0.0,
            max: 1.0,
            inc: 0.0,
            shape: SliderShape::Linear,
            modifier: 0.0,
        }
    }
}

impl SliderCurve {
    fn spans_zero(&self) -> bool {
        self.min < 0.0 && self.max > 0.0
    }

    // ------------------------------------------------------------------
    // linear

    pub fn from_normalized_linear(&self, t: f64) -> f64 {
        self.min + t * (self.max - self.min)
    }

    pub fn to_normalized_linear(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span.abs() < EPS_RANGE {
            return 0.0;
        }
        (value - self.min) / span
    }

    pub fn from_normalized_linear_raw(&self, t: f64) -> f64 {
        if self.spans_zero() {
            if t <= 0.5 {
                self.min * (1.0 - 2.0 * t)
            } else {
                self.max * (2.0 * t - 1.0)
            }
        } else {
            self.from_normalized_linear(t)
        }
    }

    pub fn to_normalized_linear_raw(&self, value: f64) -> f64 {
        if self.spans_zero() {
            if value < 0.0 {
                0.5 * (1.0 - value / self.min)
            } else {
                0.5 * (1.0 + value / self.max)
            }
        } else {
            self.to_normalized_linear(value)
        }
    }

    // ------------------------------------------------------------------
    // sqr

    fn sqr_exponent(&self) -> Option<f64> {
        let k = self.modifier;
        if !k.is_finite() || k.abs() < EPS_MODIFIER {
            None
        } else {
            Some(k)
        }
    }

    pub fn from_normalized_sqr(&self, t: f64) -> f64 {
        let Some(k) = self.sqr_exponent() else {
            return self.from_normalized_linear(t);
        };
        let w0 = signed_pow(self.min, 1.0 / k);
        let w1 = signed_pow(self.max, 1.0 / k);
        signed_pow(w0 + t * (w1 - w0), k)
    }

    pub fn to_normalized_sqr(&self, value: f64) -> f64 {
        let Some(k) = self.sqr_exponent() else {
            return self.to_normalized_linear(value);
        };
        let w0 = signed_pow(self.min, 1.0 / k);
        let w1 = signed_pow(self.max, 1.0 / k);
        if (w1 - w0).abs() < EPS_RANGE {
            return 0.0;
        }
        (signed_pow(value, 1.0 / k) - w0) / (w1 - w0)
    }

    pub fn from_normalized_sqr_raw(&self, t: f64) -> f64 {
        let Some(k) = self.sqr_exponent() else {
            return self.from_normalized_linear_raw(t);
        };
        if self.spans_zero() {
            if t <= 0.5 {
                self.min * (1.0 - 2.0 * t).powf(k)
            } else {
                self.max * (2.0 * t - 1.0).powf(k)
            }
        } else {
            self.from_normalized_sqr(t)
        }
    }

    pub fn to_normalized_sqr_raw(&self, value: f64) -> f64 {
        let Some(k) = self.sqr_exponent() else {
            return self.to_normalized_linear_raw(value);
        };
        if self.spans_zero() {
            if value < 0.0 {
                0.5 * (1.0 - (value / self.min).powf(1.0 / k))
            } else {
                0.5 * (1.0 + (value / self.max).powf(1.0 / k))
            }
        } else {
            self.to_normalized_sqr(value)
        }
    }

    // ------------------------------------------------------------------
    // log

    /// The effective center; `None` means the curve degrades to linear.
    fn log_center(&self) -> Option<f64> {
        if (self.max - self.min).abs() < EPS_RANGE {
            return None;
        }
        let center = if self.modifier.abs() < EPS_MODIFIER {
            if self.min * self.max <= 0.0 {
                return None;
            }
            signum_sqrt(self.min * self.max, self.min)
        } else {
            self.modifier
        };
        if (center - self.min).abs() < 1e-7 {
            return None;
        }
        let ratio = (self.max - center) / (center - self.min);
        if ratio <= 0.0 || (ratio - 1.0).abs() < 1e-9 {
            return None;
        }
        Some(center)
    }

    pub fn from_normalized_log(&self, t: f64) -> f64 {
        let Some(center) = self.log_center() else {
            return self.from_normalized_linear(t);
        };
        let ratio = (self.max - center) / (center - self.min);
        self.min + (center - self.min) * (ratio.powf(2.0 * t) - 1.0) / (ratio - 1.0)
    }

    pub fn to_normalized_log(&self, value: f64) -> f64 {
        let Some(center) = self.log_center() else {
            return self.to_normalized_linear(value);
        };
        let ratio = (self.max - center) / (center - self.min);
        let u = 1.0 + (value - self.min) * (ratio - 1.0) / (center - self.min);
        if u <= 0.0 {
            return 0.0;
        }
        u.ln() / (2.0 * ratio.ln())
    }

    // ------------------------------------------------------------------
    // shape dispatch

    /// Normalized → value, automation warp.
    pub fn from_normalized(&self, t: f64) -> f64 {
        match self.shape {
            SliderShape::Linear => self.from_normalized_linear(t),
            SliderShape::Log => self.from_normalized_log(t),
            SliderShape::Sqr => self.from_normalized_sqr(t),
        }
    }

    /// Value → normalized, automation warp.
    pub fn to_normalized(&self, value: f64) -> f64 {
        match self.shape {
            SliderShape::Linear => self.to_normalized_linear(value),
            SliderShape::Log => self.to_normalized_log(value),
            SliderShape::Sqr => self.to_normalized_sqr(value),
        }
    }

    /// Normalized → value as displayed on screen.
    pub fn from_normalized_raw(&self, t: f64) -> f64 {
        match self.shape {
            SliderShape::Linear => self.from_normalized_linear_raw(t),
            SliderShape::Log => self.from_normalized_log(t),
            SliderShape::Sqr => self.from_normalized_sqr_raw(t),
        }
    }

    /// Displayed value → normalized.
    pub fn to_normalized_raw(&self, value: f64) -> f64 {
        match self.shape {
            SliderShape::Linear => self.to_normalized_linear_raw(value),
            SliderShape::Log => self.to_normalized_log(value),
            SliderShape::Sqr => self.to_normalized_sqr_raw(value),
        }
    }
}

fn signed_pow(x: f64, p: f64) -> f64 {
    if x >= 0.0 {
        x.powf(p)
    } else {
        -((-x).powf(p))
    }
}

/// Geometric mean carrying the sign of the range endpoints.
fn signum_sqrt(product: f64, reference: f64) -> f64 {
    let root = product.abs().sqrt();
    if reference < 0.0 {
        -root
    } else {
        root
    }
}
