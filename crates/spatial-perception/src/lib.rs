//! `spatial-perception` – geometric leaf layer.
//!
//! Pure functions over object geometry and poses. Nothing here knows about
//! instructions or dialogue; the runtime crate composes these pieces.
//!
//! # Modules
//!
//! - [`frame`] – [`YawFrame`][frame::YawFrame]: a floor-plane reference frame
//!   (origin + yaw) that converts world offsets into signed bearings.
//! - [`geometry`] – [`GeometryAnalyzer`][geometry::GeometryAnalyzer]: volume,
//!   aspect ratio, shape class and viewpoint requirements of a bounding box.
//! - [`relations`] – [`SpatialRelationCalculator`][relations::SpatialRelationCalculator]:
//!   bearing, distance, visibility, nearby landmarks and containment of
//!   objects relative to the agent or another object.
//! - [`coverage`] – [`CoverageAccumulator`][coverage::CoverageAccumulator] and
//!   [`FaceCoverageModel`][coverage::FaceCoverageModel]: bounded coverage
//!   bookkeeping and an AABB face-visibility estimate of coverage increments.
//! - [`observation`] – [`ObservationPlanner`][observation::ObservationPlanner]:
//!   turns geometry into an ordered, coverage-bounded viewpoint plan and
//!   executes it against a [`NavigationLayer`][observation::NavigationLayer].

pub mod coverage;
pub mod frame;
pub mod geometry;
pub mod observation;
pub mod relations;

pub use coverage::{CoverageAccumulator, FaceCoverageModel};
pub use frame::YawFrame;
pub use geometry::{GeometryAnalyzer, GeometryReport, ShapeClass};
pub use observation::{
    FaceCoverageNavigator, NavigationError, NavigationLayer, NavigationStepFailure,
    ObservationPlanner, ObservationReport, ObservationStatus,
};
pub use relations::{
    Containment, ContainmentKind, NearbyLandmark, RelationRecord, SpatialRelationCalculator,
};
