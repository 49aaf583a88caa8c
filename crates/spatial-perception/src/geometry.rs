//! Bounding-box geometry analysis.
//!
//! [`GeometryAnalyzer::analyze`] is a pure function of an object's bounding
//! box: it never reads the agent pose or the scene, and identical input
//! always yields an identical [`GeometryReport`].
//!
//! # Example
//!
//! ```rust
//! use spatial_perception::geometry::{GeometryAnalyzer, ShapeClass};
//! use spatial_types::{BoundingSize, EngineConfig, ObjectRecord, Vec3};
//!
//! let analyzer = GeometryAnalyzer::new(&EngineConfig::default());
//! let sofa = ObjectRecord::new("Sofa|1", "Sofa", Vec3::zero(), BoundingSize::new(2.8, 0.9, 1.0));
//!
//! let report = analyzer.analyze(&sofa).unwrap();
//! assert!(report.needs_multi_view);
//! assert_eq!(report.shape_class, ShapeClass::Elongated);
//! ```

use spatial_types::config::MAX_VIEWPOINTS_LIMIT;
use spatial_types::{BoundingSize, EngineConfig, ObjectRecord, SpatialError, ViewpointKind};

/// Smallest dimension used as an aspect-ratio divisor.
const MIN_DIVISOR: f32 = 0.01;

/// Largest dimension (m) above which front-left/front-right views are added.
pub const DIAGONAL_VIEW_DIMENSION: f32 = 1.5;
/// Largest dimension (m) above which side-left/side-right views are added.
pub const SIDE_VIEW_DIMENSION: f32 = 2.5;
/// Height (m) above which a top view is added.
pub const TOP_VIEW_HEIGHT: f32 = 1.5;

/// Coarse shape of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeClass {
    /// No dimension dominates.
    Compact,
    /// One dimension dominates the smallest by more than the elongation ratio.
    Elongated,
    /// Thin along one axis with a comparable footprint on the other two.
    Flat,
}

/// Result of analysing one bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryReport {
    pub object_id: String,
    pub size: BoundingSize,
    pub volume: f32,
    pub max_dimension: f32,
    pub min_dimension: f32,
    /// `max_dimension / max(min_dimension, 0.01)`.
    pub aspect_ratio: f32,
    pub shape_class: ShapeClass,
    pub needs_multi_view: bool,
    /// Viewpoints the planner will emit, in priority order.
    pub viewpoint_kinds: Vec<ViewpointKind>,
}

impl GeometryReport {
    pub fn required_viewpoints(&self) -> usize {
        self.viewpoint_kinds.len()
    }
}

/// Classifies bounding boxes and decides how many viewpoints they need.
#[derive(Debug, Clone)]
pub struct GeometryAnalyzer {
    large_volume: f32,
    large_dimension: f32,
    elongated_ratio: f32,
    flat_ratio: f32,
    max_viewpoints: usize,
}

impl GeometryAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            large_volume: config.large_object_volume_threshold,
            large_dimension: config.large_object_max_dimension,
            elongated_ratio: config.elongated_aspect_ratio,
            flat_ratio: config.flat_ratio,
            max_viewpoints: config.max_viewpoints.clamp(1, MAX_VIEWPOINTS_LIMIT),
        }
    }

    /// Analyse `object`'s bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidGeometry`] when any dimension is not a
    /// finite positive number or the centre is not finite.
    pub fn analyze(&self, object: &ObjectRecord) -> Result<GeometryReport, SpatialError> {
        if !object.center.is_finite() {
            return Err(SpatialError::InvalidGeometry {
                object_id: object.id.clone(),
                reason: "centre is not finite".to_string(),
            });
        }
        self.analyze_size(&object.id, object.bounding_size)
    }

    /// Analyse a bare bounding size.
    pub fn analyze_size(
        &self,
        object_id: &str,
        size: BoundingSize,
    ) -> Result<GeometryReport, SpatialError> {
        for (axis, v) in [("width", size.x), ("height", size.y), ("depth", size.z)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(SpatialError::InvalidGeometry {
                    object_id: object_id.to_string(),
                    reason: format!("{axis} must be a positive finite number, got {v}"),
                });
            }
        }

        let volume = size.x * size.y * size.z;
        let max_dimension = size.max_dimension();
        let min_dimension = size.min_dimension();
        let aspect_ratio = max_dimension / min_dimension.max(MIN_DIVISOR);

        let shape_class = self.classify(size, aspect_ratio);
        let needs_multi_view = volume > self.large_volume
            || max_dimension > self.large_dimension
            || aspect_ratio > self.elongated_ratio;
        let viewpoint_kinds = self.viewpoint_kinds(size, needs_multi_view);

        Ok(GeometryReport {
            object_id: object_id.to_string(),
            size,
            volume,
            max_dimension,
            min_dimension,
            aspect_ratio,
            shape_class,
            needs_multi_view,
            viewpoint_kinds,
        })
    }

    /// Flat wins over elongated: a thin slab whose two larger sides are
    /// comparable is flat even though its max/min ratio is large.
    fn classify(&self, size: BoundingSize, aspect_ratio: f32) -> ShapeClass {
        let mut dims = [size.x, size.y, size.z];
        dims.sort_by(f32::total_cmp);
        let [min, mid, max] = dims;
        let planform_ratio = max / mid.max(MIN_DIVISOR);

        if min < self.flat_ratio * max && planform_ratio <= self.elongated_ratio {
            ShapeClass::Flat
        } else if aspect_ratio > self.elongated_ratio {
            ShapeClass::Elongated
        } else {
            ShapeClass::Compact
        }
    }

    fn viewpoint_kinds(&self, size: BoundingSize, needs_multi_view: bool) -> Vec<ViewpointKind> {
        let mut kinds = vec![ViewpointKind::FrontCenter];
        if !needs_multi_view {
            return kinds;
        }
        let max_dimension = size.max_dimension();
        if max_dimension > DIAGONAL_VIEW_DIMENSION {
            kinds.extend([ViewpointKind::FrontLeft, ViewpointKind::FrontRight]);
        }
        if max_dimension > SIDE_VIEW_DIMENSION {
            kinds.extend([ViewpointKind::SideLeft, ViewpointKind::SideRight]);
        }
        if size.height() > TOP_VIEW_HEIGHT {
            kinds.push(ViewpointKind::Top);
        }
        kinds.truncate(self.max_viewpoints);
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_types::Vec3;

    fn analyzer() -> GeometryAnalyzer {
        GeometryAnalyzer::new(&EngineConfig::default())
    }

    fn report(x: f32, y: f32, z: f32) -> GeometryReport {
        analyzer().analyze_size("obj", BoundingSize::new(x, y, z)).unwrap()
    }

    #[test]
    fn cup_is_single_view_compact() {
        let r = report(0.1, 0.12, 0.1);
        assert!(!r.needs_multi_view);
        assert_eq!(r.shape_class, ShapeClass::Compact);
        assert_eq!(r.viewpoint_kinds, vec![ViewpointKind::FrontCenter]);
        assert!((r.volume - 0.0012).abs() < 1e-6);
        assert!((r.aspect_ratio - 1.2).abs() < 1e-4);
    }

    #[test]
    fn sofa_needs_five_viewpoints() {
        let r = report(2.8, 0.9, 1.0);
        assert!(r.needs_multi_view);
        assert_eq!(r.required_viewpoints(), 5);
        assert!(!r.viewpoint_kinds.contains(&ViewpointKind::Top));
    }

    #[test]
    fn multi_view_ignores_surface_extent() {
        // An armchair: 1.0 × 0.95 × 0.9, over 5.5 m² of surface but under
        // every volume, dimension and aspect threshold.
        let r = report(1.0, 0.95, 0.9);
        assert!(r.volume < 1.0);
        assert!(!r.needs_multi_view);
        assert_eq!(r.viewpoint_kinds, vec![ViewpointKind::FrontCenter]);
    }

    #[test]
    fn long_thin_object_is_elongated() {
        let r = report(2.0, 0.1, 0.3);
        assert_eq!(r.shape_class, ShapeClass::Elongated);
        assert!(r.needs_multi_view);
    }

    #[test]
    fn thin_slab_is_flat() {
        // A rug: 1.6 × 0.02 × 1.2.
        let r = report(1.6, 0.02, 1.2);
        assert_eq!(r.shape_class, ShapeClass::Flat);
    }

    #[test]
    fn tall_object_gets_top_view() {
        // A fridge: 0.8 × 1.8 × 0.7, volume 1.008 > 1.0.
        let r = report(0.8, 1.8, 0.7);
        assert!(r.needs_multi_view);
        assert!(r.viewpoint_kinds.contains(&ViewpointKind::Top));
    }

    #[test]
    fn viewpoints_capped_at_five() {
        // Would qualify for all six candidate kinds.
        let r = report(3.0, 2.0, 3.0);
        assert_eq!(r.required_viewpoints(), 5);
    }

    #[test]
    fn zero_dimension_is_invalid() {
        let err = analyzer()
            .analyze_size("Book|1", BoundingSize::new(0.2, 0.0, 0.3))
            .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidGeometry { ref object_id, .. } if object_id == "Book|1"));
    }

    #[test]
    fn nan_dimension_and_centre_are_invalid() {
        assert!(analyzer()
            .analyze_size("x", BoundingSize::new(f32::NAN, 1.0, 1.0))
            .is_err());
        let obj = ObjectRecord::new(
            "x",
            "Box",
            Vec3::new(f32::INFINITY, 0.0, 0.0),
            BoundingSize::new(1.0, 1.0, 1.0),
        );
        assert!(analyzer().analyze(&obj).is_err());
    }

    #[test]
    fn analysis_is_pure() {
        let a = report(1.3, 0.7, 0.9);
        let b = report(1.3, 0.7, 0.9);
        assert_eq!(a, b);
    }

    #[test]
    fn multi_view_monotonic_in_max_dimension() {
        let mut previous = 0usize;
        let mut was_multi = false;
        for step in 5..=40 {
            let width = step as f32 * 0.1;
            let r = report(width, 0.5, 0.5);
            assert!(!was_multi || r.needs_multi_view, "regressed at width {width}");
            assert!(r.required_viewpoints() >= previous, "fewer viewpoints at width {width}");
            was_multi = r.needs_multi_view;
            previous = r.required_viewpoints();
        }
        assert!(was_multi);
    }

    #[test]
    fn thresholds_come_from_config() {
        let cfg = EngineConfig {
            large_object_volume_threshold: 0.001,
            ..Default::default()
        };
        let r = GeometryAnalyzer::new(&cfg)
            .analyze_size("cup", BoundingSize::new(0.1, 0.12, 0.1))
            .unwrap();
        assert!(r.needs_multi_view);
    }
}
