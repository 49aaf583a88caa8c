//! Engine configuration surface.
//!
//! Every field carries a serde default so partial TOML files load cleanly.

use serde::{Deserialize, Serialize};

/// Upper bound on viewpoints in any observation plan.
pub const MAX_VIEWPOINTS_LIMIT: usize = 5;

/// Tunable thresholds for geometry analysis, scoring, observation planning
/// and clarification dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // ── Geometry ────────────────────────────────────────────────────────────
    /// Volume (m³) above which an object needs several viewpoints.
    #[serde(default = "default_large_volume")]
    pub large_object_volume_threshold: f32,
    /// Largest dimension (m) above which an object needs several viewpoints.
    #[serde(default = "default_large_dimension")]
    pub large_object_max_dimension: f32,
    /// Aspect ratio above which an object is classed as elongated.
    #[serde(default = "default_elongated_ratio")]
    pub elongated_aspect_ratio: f32,
    /// Smallest/largest dimension ratio below which an object is flat.
    #[serde(default = "default_flat_ratio")]
    pub flat_ratio: f32,

    // ── Observation ─────────────────────────────────────────────────────────
    #[serde(default = "default_coverage_target")]
    pub coverage_target: f32,
    /// Field of view (degrees) used when the object fits without widening.
    #[serde(default = "default_fov")]
    pub default_field_of_view: f32,
    #[serde(default = "default_max_fov")]
    pub max_field_of_view: f32,
    /// Degrees added on top of a widened field of view.
    #[serde(default = "default_fov_margin")]
    pub fov_safety_margin: f32,
    #[serde(default = "default_min_view_distance")]
    pub min_view_distance: f32,
    #[serde(default = "default_max_view_distance")]
    pub max_view_distance: f32,
    /// Stand-off distance per metre of the object's largest dimension.
    #[serde(default = "default_view_distance_factor")]
    pub view_distance_factor: f32,
    #[serde(default = "default_max_viewpoints")]
    pub max_viewpoints: usize,

    // ── Relations ───────────────────────────────────────────────────────────
    #[serde(default = "default_landmark_radius")]
    pub landmark_radius: f32,
    #[serde(default = "default_landmark_types")]
    pub landmark_types: Vec<String>,
    #[serde(default = "default_near_distance")]
    pub near_distance: f32,
    #[serde(default = "default_far_distance")]
    pub far_distance: f32,
    /// Bearings within ± this many degrees count as straight ahead.
    #[serde(default = "default_dead_zone")]
    pub direction_dead_zone_degrees: f32,

    // ── Resolution ──────────────────────────────────────────────────────────
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_confidence_gap")]
    pub confidence_gap_threshold: f32,
    /// Multiplier applied to candidates already interacted with.
    #[serde(default = "default_history_penalty")]
    pub history_penalty: f32,

    // ── Clarification ───────────────────────────────────────────────────────
    #[serde(default = "default_max_turns")]
    pub max_clarification_turns: u32,
    #[serde(default = "default_timeout_secs")]
    pub clarification_timeout_seconds: u64,
}

fn default_large_volume() -> f32 {
    1.0
}
fn default_large_dimension() -> f32 {
    2.0
}
fn default_elongated_ratio() -> f32 {
    3.0
}
fn default_flat_ratio() -> f32 {
    0.15
}
fn default_coverage_target() -> f32 {
    0.85
}
fn default_fov() -> f32 {
    60.0
}
fn default_max_fov() -> f32 {
    120.0
}
fn default_fov_margin() -> f32 {
    10.0
}
fn default_min_view_distance() -> f32 {
    1.0
}
fn default_max_view_distance() -> f32 {
    2.5
}
fn default_view_distance_factor() -> f32 {
    1.5
}
fn default_max_viewpoints() -> usize {
    MAX_VIEWPOINTS_LIMIT
}
fn default_landmark_radius() -> f32 {
    2.0
}
fn default_landmark_types() -> Vec<String> {
    ["Window", "Door", "DoorFrame", "Wall"].map(String::from).to_vec()
}
fn default_near_distance() -> f32 {
    1.5
}
fn default_far_distance() -> f32 {
    3.0
}
fn default_dead_zone() -> f32 {
    5.0
}
fn default_confidence() -> f32 {
    0.7
}
fn default_confidence_gap() -> f32 {
    0.3
}
fn default_history_penalty() -> f32 {
    0.5
}
fn default_max_turns() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            large_object_volume_threshold: default_large_volume(),
            large_object_max_dimension: default_large_dimension(),
            elongated_aspect_ratio: default_elongated_ratio(),
            flat_ratio: default_flat_ratio(),
            coverage_target: default_coverage_target(),
            default_field_of_view: default_fov(),
            max_field_of_view: default_max_fov(),
            fov_safety_margin: default_fov_margin(),
            min_view_distance: default_min_view_distance(),
            max_view_distance: default_max_view_distance(),
            view_distance_factor: default_view_distance_factor(),
            max_viewpoints: default_max_viewpoints(),
            landmark_radius: default_landmark_radius(),
            landmark_types: default_landmark_types(),
            near_distance: default_near_distance(),
            far_distance: default_far_distance(),
            direction_dead_zone_degrees: default_dead_zone(),
            confidence_threshold: default_confidence(),
            confidence_gap_threshold: default_confidence_gap(),
            history_penalty: default_history_penalty(),
            max_clarification_turns: default_max_turns(),
            clarification_timeout_seconds: default_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Clamp every field into its meaningful range.
    ///
    /// Fractions are forced into `[0, 1]`, `max_viewpoints` into
    /// `1..=MAX_VIEWPOINTS_LIMIT`, the view-distance band is reordered when
    /// inverted and at least one clarification turn is always allowed.
    pub fn validate(mut self) -> Self {
        self.coverage_target = self.coverage_target.clamp(0.0, 1.0);
        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.confidence_gap_threshold = self.confidence_gap_threshold.clamp(0.0, 1.0);
        self.history_penalty = self.history_penalty.clamp(0.0, 1.0);
        self.max_viewpoints = self.max_viewpoints.clamp(1, MAX_VIEWPOINTS_LIMIT);
        self.max_clarification_turns = self.max_clarification_turns.max(1);
        if self.min_view_distance > self.max_view_distance {
            std::mem::swap(&mut self.min_view_distance, &mut self.max_view_distance);
        }
        self.max_field_of_view = self.max_field_of_view.clamp(1.0, 179.0);
        self.default_field_of_view = self.default_field_of_view.clamp(1.0, self.max_field_of_view);
        self.fov_safety_margin = self.fov_safety_margin.max(0.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert!((cfg.large_object_volume_threshold - 1.0).abs() < 1e-6);
        assert!((cfg.coverage_target - 0.85).abs() < 1e-6);
        assert!((cfg.confidence_threshold - 0.7).abs() < 1e-6);
        assert!((cfg.confidence_gap_threshold - 0.3).abs() < 1e-6);
        assert_eq!(cfg.max_clarification_turns, 3);
        assert_eq!(cfg.clarification_timeout_seconds, 30);
        assert!((cfg.max_field_of_view - 120.0).abs() < 1e-6);
        assert!((cfg.fov_safety_margin - 10.0).abs() < 1e-6);
        assert_eq!(cfg.max_viewpoints, 5);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"coverage_target": 0.9}"#).unwrap();
        assert!((cfg.coverage_target - 0.9).abs() < 1e-6);
        assert_eq!(cfg.max_clarification_turns, 3);
        assert_eq!(cfg.landmark_types.len(), 4);
        assert!(cfg.landmark_types.iter().any(|t| t == "Wall"));
    }

    #[test]
    fn validate_clamps_out_of_range_values() {
        let cfg = EngineConfig {
            coverage_target: 1.7,
            confidence_threshold: -0.2,
            max_viewpoints: 12,
            max_clarification_turns: 0,
            min_view_distance: 3.0,
            max_view_distance: 1.0,
            ..Default::default()
        }
        .validate();
        assert!((cfg.coverage_target - 1.0).abs() < 1e-6);
        assert!(cfg.confidence_threshold.abs() < 1e-6);
        assert_eq!(cfg.max_viewpoints, MAX_VIEWPOINTS_LIMIT);
        assert_eq!(cfg.max_clarification_turns, 1);
        assert!(cfg.min_view_distance < cfg.max_view_distance);
    }
}
