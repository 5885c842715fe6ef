//! Simulation tuning configuration (§2.1 C13 ambient stack).
//!
//! Mirrors the teacher's own `Config`-style struct: a plain value with a
//! `Default` impl seeded from the documented constants in [`crate::constants`],
//! overridable field-by-field by the out-of-scope CLI layer. Nothing in this
//! crate reads environment variables directly.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AI_SPAWN_INTERVAL_MAX, AI_SPAWN_INTERVAL_MIN, DEFAULT_BATTLEFIELD_HEIGHT, DEFAULT_BATTLEFIELD_WIDTH,
    DEFAULT_GROUND_HEIGHT_RATIO, LANE_MARGIN, SPAWN_Y_MAX, SPAWN_Y_MIN,
};

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub battlefield_w: f32,
    pub battlefield_h: f32,
    pub ground_height_ratio: f32,
    pub lane_margin: f32,
    pub spawn_y_min: f32,
    pub spawn_y_max: f32,
    pub ai_spawn_interval_min: f32,
    pub ai_spawn_interval_max: f32,
    /// `desiredRange` fractions averaged into a single multiplier applied
    /// to a unit's mean alive-weapon range (§4.6 step 2): `desired_range =
    /// clamp(avgRange * (near+far)/2, desired_range_min, desired_range_max)`.
    /// Not a near/far clamp band — the two fractions are blended before the
    /// final `[min, max]` clamp, which is the only clamping that happens.
    pub desired_range_near_fraction: f32,
    pub desired_range_far_fraction: f32,
    pub desired_range_min: f32,
    pub desired_range_max: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            battlefield_w: DEFAULT_BATTLEFIELD_WIDTH,
            battlefield_h: DEFAULT_BATTLEFIELD_HEIGHT,
            ground_height_ratio: DEFAULT_GROUND_HEIGHT_RATIO,
            lane_margin: LANE_MARGIN,
            spawn_y_min: SPAWN_Y_MIN,
            spawn_y_max: SPAWN_Y_MAX,
            ai_spawn_interval_min: AI_SPAWN_INTERVAL_MIN,
            ai_spawn_interval_max: AI_SPAWN_INTERVAL_MAX,
            desired_range_near_fraction: 0.52,
            desired_range_far_fraction: 0.62,
            desired_range_min: 80.0,
            desired_range_max: 420.0,
        }
    }
}

impl SimConfig {
    pub fn ground_y(&self) -> f32 {
        self.battlefield_h * self.ground_height_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let c = SimConfig::default();
        assert_eq!(c.battlefield_w, DEFAULT_BATTLEFIELD_WIDTH);
        assert_eq!(c.ground_y(), DEFAULT_BATTLEFIELD_HEIGHT * DEFAULT_GROUND_HEIGHT_RATIO);
    }

    #[test]
    fn fields_are_independently_overridable() {
        let mut c = SimConfig::default();
        c.battlefield_w = 4000.0;
        assert_eq!(c.battlefield_w, 4000.0);
        assert_eq!(c.battlefield_h, DEFAULT_BATTLEFIELD_HEIGHT);
    }
}
