//! Walking cadence estimate from belt speed.

use serde::{Deserialize, Serialize};

/// Breakpoints of the cadence curve as (km/h, steps per minute).
const CURVE: [(f64, f64); 4] = [(0.0, 0.0), (2.0, 78.0), (2.6, 92.0), (3.0, 100.0)];

/// What the curve does past its last breakpoint (3.0 km/h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AboveRangePolicy {
    /// Keep the slope of the last segment (20 spm per km/h).
    #[default]
    Extrapolate,
    /// Hold at 100 spm.
    Clamp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepCurve {
    pub above_range: AboveRangePolicy,
}

impl StepCurve {
    pub fn new(above_range: AboveRangePolicy) -> Self {
        Self { above_range }
    }

    /// Estimated steps per minute at `speed_kmh`.
    pub fn steps_per_minute(&self, speed_kmh: f64) -> f64 {
        if !(speed_kmh > 0.0) {
            return 0.0;
        }

        for pair in CURVE.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if speed_kmh <= x1 {
                return interpolate(x0, y0, x1, y1, speed_kmh);
            }
        }

        let (x0, y0) = CURVE[CURVE.len() - 2];
        let (x1, y1) = CURVE[CURVE.len() - 1];
        match self.above_range {
            AboveRangePolicy::Extrapolate => interpolate(x0, y0, x1, y1, speed_kmh),
            AboveRangePolicy::Clamp => y1,
        }
    }
}

fn interpolate(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}
