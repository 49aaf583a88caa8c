//! Adaptive observation planning and execution.
//!
//! [`ObservationPlanner::plan`] turns an object's bounding geometry into an
//! ordered list of at most five viewpoints:
//!
//! 1. The [`GeometryAnalyzer`] decides which viewpoint kinds are needed.
//! 2. Each kind is placed on a circle around the object at the stand-off
//!    distance, offset from the side facing the agent.
//! 3. The field of view is widened where the object's projected width does
//!    not fit the default.
//! 4. Viewpoints are ordered greedily by travel distance from the agent.
//!
//! [`ObservationPlanner::execute`] walks a plan against an external
//! [`NavigationLayer`], skipping unreachable viewpoints and stopping as soon
//! as the accumulated coverage reaches the target.
//!
//! # Example
//!
//! ```rust
//! use spatial_perception::observation::ObservationPlanner;
//! use spatial_types::{AgentPose, BoundingSize, EngineConfig, ObjectRecord, ObservationKind, Vec3};
//!
//! let planner = ObservationPlanner::new(EngineConfig::default());
//! let cup = ObjectRecord::new("Cup|1", "Cup", Vec3::new(0.0, 0.9, 2.0), BoundingSize::new(0.1, 0.12, 0.1));
//! let agent = AgentPose::new(Vec3::zero(), 0.0);
//!
//! let plan = planner.plan(&cup, &agent).unwrap();
//! assert_eq!(plan.kind, ObservationKind::SingleView);
//! assert_eq!(plan.viewpoints.len(), 1);
//! ```

use spatial_types::{
    AgentPose, EngineConfig, ObjectRecord, ObservationKind, ObservationStrategy, SpatialError,
    Vec3, ViewRotation, Viewpoint, ViewpointKind,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coverage::{CoverageAccumulator, FaceCoverageModel};
use crate::frame::{heading_between, heading_vector, normalize_degrees};
use crate::geometry::GeometryAnalyzer;

/// Height above the object's top at which the top viewpoint is placed.
const TOP_VIEW_CLEARANCE: f32 = 0.5;
/// Closest the camera is assumed to get to the object's near face.
const MIN_FRAMING_DISTANCE: f32 = 0.1;

// ────────────────────────────────────────────────────────────────────────────
// Navigation contract
// ────────────────────────────────────────────────────────────────────────────

/// Why the navigation layer could not serve a viewpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("Viewpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Navigation failed: {0}")]
    Failed(String),
}

/// External navigation primitive.
///
/// `visit` moves the agent to the viewpoint, captures a view and returns the
/// fraction of the object's surface newly observed from there. Pathfinding
/// and any timeout around the move are the implementor's responsibility.
pub trait NavigationLayer {
    fn visit(&mut self, viewpoint: &Viewpoint) -> Result<f32, NavigationError>;
}

/// One skipped viewpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStepFailure {
    /// Position of the viewpoint in the plan.
    pub viewpoint_index: usize,
    pub kind: ViewpointKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationStatus {
    /// Coverage reached the target; remaining viewpoints were not visited.
    TargetReached,
    /// Every viewpoint was attempted without reaching the target.
    Exhausted,
    /// No viewpoint could be reached.
    StrategyFailed,
}

impl ObservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationStatus::TargetReached => "target_reached",
            ObservationStatus::Exhausted => "exhausted",
            ObservationStatus::StrategyFailed => "strategy_failed",
        }
    }
}

/// Result of executing an [`ObservationStrategy`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationReport {
    pub object_id: String,
    pub status: ObservationStatus,
    /// Accumulated coverage in `[0, 1]`.
    pub coverage: f32,
    /// Plan indices of the viewpoints that were reached, in visit order.
    pub visited: Vec<usize>,
    pub failures: Vec<NavigationStepFailure>,
    /// Coverage after each reached viewpoint.
    pub coverage_trace: Vec<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// FaceCoverageNavigator
// ────────────────────────────────────────────────────────────────────────────

/// A [`NavigationLayer`] that reaches every viewpoint instantly and scores it
/// with a [`FaceCoverageModel`] of the target object.
///
/// Useful as an offline coverage estimator and in tests. Visits to blocked
/// viewpoint kinds fail with [`NavigationError::Unreachable`].
#[derive(Debug, Clone)]
pub struct FaceCoverageNavigator {
    model: FaceCoverageModel,
    unreachable: Vec<ViewpointKind>,
}

impl FaceCoverageNavigator {
    pub fn new(target: &ObjectRecord) -> Self {
        Self {
            model: FaceCoverageModel::for_object(target),
            unreachable: Vec::new(),
        }
    }

    /// Fail every visit to a viewpoint of `kind`.
    pub fn block(mut self, kind: ViewpointKind) -> Self {
        self.unreachable.push(kind);
        self
    }

    pub fn model(&self) -> &FaceCoverageModel {
        &self.model
    }
}

impl NavigationLayer for FaceCoverageNavigator {
    fn visit(&mut self, viewpoint: &Viewpoint) -> Result<f32, NavigationError> {
        if self.unreachable.contains(&viewpoint.kind) {
            return Err(NavigationError::Unreachable(format!("{:?} is blocked", viewpoint.kind)));
        }
        Ok(self.model.observe(viewpoint.position))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObservationPlanner
// ────────────────────────────────────────────────────────────────────────────

/// Plans and executes coverage-bounded viewpoint sequences.
#[derive(Debug, Clone)]
pub struct ObservationPlanner {
    config: EngineConfig,
    analyzer: GeometryAnalyzer,
}

impl ObservationPlanner {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validate();
        let analyzer = GeometryAnalyzer::new(&config);
        Self { config, analyzer }
    }

    pub fn analyzer(&self) -> &GeometryAnalyzer {
        &self.analyzer
    }

    /// Plan viewpoints for `object` as seen from `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidGeometry`] when the object's bounding
    /// data is malformed. See [`plan_or_default`][Self::plan_or_default] for
    /// the infallible variant.
    pub fn plan(
        &self,
        object: &ObjectRecord,
        agent: &AgentPose,
    ) -> Result<ObservationStrategy, SpatialError> {
        let report = self.analyzer.analyze(object)?;
        let standoff = self.standoff_distance(report.max_dimension);

        // Heading from the object towards the agent defines its "front".
        let front = if object.center.planar_distance(agent.position) < f32::EPSILON {
            object.rotation_y
        } else {
            heading_between(object.center, agent.position)
        };

        let candidates: Vec<Viewpoint> = report
            .viewpoint_kinds
            .iter()
            .map(|&kind| {
                self.place(
                    kind,
                    object,
                    agent,
                    front,
                    standoff,
                    report.needs_multi_view,
                )
            })
            .collect();
        let viewpoints = order_nearest_neighbour(agent.position, candidates);

        let kind = if report.needs_multi_view {
            ObservationKind::MultiView
        } else {
            ObservationKind::SingleView
        };

        info!(
            object_id = %object.id,
            kind = ?kind,
            viewpoints = viewpoints.len(),
            standoff,
            "observation plan emitted"
        );

        Ok(ObservationStrategy {
            object_id: object.id.clone(),
            kind,
            viewpoints,
            target_coverage: self.config.coverage_target,
        })
    }

    /// Like [`plan`][Self::plan], but degrades to a single default viewpoint
    /// at the agent's own position when the geometry is malformed.
    pub fn plan_or_default(&self, object: &ObjectRecord, agent: &AgentPose) -> ObservationStrategy {
        match self.plan(object, agent) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(object_id = %object.id, error = %e, "falling back to default viewpoint");
                let yaw = if object.center.is_finite()
                    && object.center.planar_distance(agent.position) > f32::EPSILON
                {
                    heading_between(agent.position, object.center)
                } else {
                    agent.yaw_deg
                };
                ObservationStrategy {
                    object_id: object.id.clone(),
                    kind: ObservationKind::SingleView,
                    viewpoints: vec![Viewpoint {
                        kind: ViewpointKind::FrontCenter,
                        position: agent.position,
                        rotation: ViewRotation {
                            yaw_deg: yaw,
                            pitch_deg: 0.0,
                        },
                        field_of_view_deg: self.config.default_field_of_view,
                    }],
                    target_coverage: self.config.coverage_target,
                }
            }
        }
    }

    /// Walk `strategy` in order against `nav`.
    ///
    /// Failed viewpoints are recorded and skipped without retry. Execution
    /// stops as soon as coverage reaches the strategy's target.
    pub fn execute(
        &self,
        strategy: &ObservationStrategy,
        nav: &mut dyn NavigationLayer,
    ) -> ObservationReport {
        let mut acc = CoverageAccumulator::new(strategy.target_coverage);
        let mut visited = Vec::new();
        let mut failures = Vec::new();

        for (index, vp) in strategy.viewpoints.iter().enumerate() {
            match nav.visit(vp) {
                Ok(increment) => {
                    let total = acc.add(increment);
                    visited.push(index);
                    debug!(
                        object_id = %strategy.object_id,
                        index,
                        increment,
                        total,
                        "viewpoint observed"
                    );
                    if acc.reached() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        object_id = %strategy.object_id,
                        index,
                        error = %e,
                        "viewpoint skipped"
                    );
                    failures.push(NavigationStepFailure {
                        viewpoint_index: index,
                        kind: vp.kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let status = if acc.reached() {
            ObservationStatus::TargetReached
        } else if visited.is_empty() && !failures.is_empty() {
            ObservationStatus::StrategyFailed
        } else {
            ObservationStatus::Exhausted
        };

        info!(
            object_id = %strategy.object_id,
            status = status.as_str(),
            coverage = acc.total(),
            failures = failures.len(),
            "observation finished"
        );

        ObservationReport {
            object_id: strategy.object_id.clone(),
            status,
            coverage: acc.total(),
            visited,
            failures,
            coverage_trace: acc.into_trace(),
        }
    }

    /// Centre-to-camera distance: proportional to the largest dimension,
    /// clamped to the configured band.
    pub fn standoff_distance(&self, max_dimension: f32) -> f32 {
        (max_dimension * self.config.view_distance_factor)
            .clamp(self.config.min_view_distance, self.config.max_view_distance)
    }

    fn place(
        &self,
        kind: ViewpointKind,
        object: &ObjectRecord,
        agent: &AgentPose,
        front: f32,
        standoff: f32,
        widen: bool,
    ) -> Viewpoint {
        let offset = match kind {
            ViewpointKind::FrontCenter | ViewpointKind::Top => 0.0,
            ViewpointKind::FrontLeft => 45.0,
            ViewpointKind::FrontRight => -45.0,
            ViewpointKind::SideLeft => 90.0,
            ViewpointKind::SideRight => -90.0,
        };
        let around = heading_vector(front + offset).scale(standoff);
        let mut position = Vec3::new(
            object.center.x + around.x,
            agent.position.y,
            object.center.z + around.z,
        );

        let mut pitch_deg = 0.0;
        if kind == ViewpointKind::Top {
            position.y = object.center.y + object.bounding_size.height() / 2.0 + TOP_VIEW_CLEARANCE;
            pitch_deg = (position.y - object.center.y).atan2(standoff).to_degrees();
        }

        let yaw_deg = heading_between(position, object.center);
        let field_of_view_deg = if widen {
            self.field_of_view(object, yaw_deg, standoff)
        } else {
            self.config.default_field_of_view
        };

        Viewpoint {
            kind,
            position,
            rotation: ViewRotation { yaw_deg, pitch_deg },
            field_of_view_deg,
        }
    }

    /// Field of view needed to frame the object's projected width when
    /// looking along `view_yaw` from `standoff` metres away.
    fn field_of_view(&self, object: &ObjectRecord, view_yaw: f32, standoff: f32) -> f32 {
        let size = object.bounding_size;
        let h = normalize_degrees(view_yaw - object.rotation_y).to_radians();
        let (sin, cos) = (h.sin().abs(), h.cos().abs());
        let width = size.x * cos + size.z * sin;
        let depth = size.x * sin + size.z * cos;
        let distance = (standoff - depth / 2.0).max(MIN_FRAMING_DISTANCE);

        let required = (2.0 * (width / (2.0 * distance)).atan()).to_degrees();
        if required > self.config.default_field_of_view {
            (required + self.config.fov_safety_margin).min(self.config.max_field_of_view)
        } else {
            self.config.default_field_of_view
        }
    }
}

/// Greedy nearest-neighbour tour starting at `start`; ties go to the
/// earlier candidate.
fn order_nearest_neighbour(start: Vec3, mut pending: Vec<Viewpoint>) -> Vec<Viewpoint> {
    let mut ordered = Vec::with_capacity(pending.len());
    let mut cursor = start;
    while !pending.is_empty() {
        let mut best = 0;
        let mut best_d = f32::INFINITY;
        for (i, vp) in pending.iter().enumerate() {
            let d = cursor.planar_distance(vp.position);
            if d < best_d {
                best = i;
                best_d = d;
            }
        }
        let next = pending.remove(best);
        cursor = next.position;
        ordered.push(next);
    }
    ordered
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_types::BoundingSize;

    fn planner() -> ObservationPlanner {
        ObservationPlanner::new(EngineConfig::default())
    }

    fn sofa() -> ObjectRecord {
        ObjectRecord::new("Sofa|1", "Sofa", Vec3::new(0.0, 0.45, 4.0), BoundingSize::new(2.8, 0.9, 1.0))
    }

    fn cup() -> ObjectRecord {
        ObjectRecord::new("Cup|1", "Cup", Vec3::new(0.0, 0.9, 2.0), BoundingSize::new(0.1, 0.12, 0.1))
    }

    fn agent() -> AgentPose {
        AgentPose::new(Vec3::new(0.0, 0.9, 0.0), 0.0)
    }

    /// Scripted navigation: fixed increments, `None` means failure.
    struct Scripted {
        steps: Vec<Option<f32>>,
        calls: usize,
    }

    impl NavigationLayer for Scripted {
        fn visit(&mut self, _vp: &Viewpoint) -> Result<f32, NavigationError> {
            let step = self.steps.get(self.calls).copied().flatten();
            self.calls += 1;
            step.ok_or_else(|| NavigationError::Unreachable("blocked".into()))
        }
    }

    // ── Planning ────────────────────────────────────────────────────────────

    #[test]
    fn cup_gets_one_default_viewpoint() {
        let plan = planner().plan(&cup(), &agent()).unwrap();
        assert_eq!(plan.kind, ObservationKind::SingleView);
        assert_eq!(plan.viewpoints.len(), 1);
        let vp = plan.viewpoints[0];
        assert!((vp.field_of_view_deg - 60.0).abs() < 1e-5);
        // Stand-off clamps to the 1.0 m minimum, on the agent's side.
        assert!((vp.position.z - 1.0).abs() < 1e-4);
        assert!(vp.rotation.yaw_deg.abs() < 1e-3 || (vp.rotation.yaw_deg - 360.0).abs() < 1e-3);
    }

    #[test]
    fn sofa_gets_widened_multi_view() {
        let plan = planner().plan(&sofa(), &agent()).unwrap();
        assert_eq!(plan.kind, ObservationKind::MultiView);
        assert!(plan.viewpoints.len() >= 3);
        assert!(plan.viewpoints.len() <= 5);
        assert!(plan.viewpoints.iter().any(|vp| vp.field_of_view_deg > 60.0));
        assert!(plan.viewpoints.iter().all(|vp| vp.field_of_view_deg <= 120.0));
        assert!((plan.target_coverage - 0.85).abs() < 1e-6);
    }

    #[test]
    fn front_view_of_sofa_is_widened_by_margin() {
        let plan = planner().plan(&sofa(), &agent()).unwrap();
        let front = plan
            .viewpoints
            .iter()
            .find(|vp| vp.kind == ViewpointKind::FrontCenter)
            .unwrap();
        // 2·atan(2.8 / (2·2.0)) ≈ 69.98°, plus the 10° margin.
        assert!((front.field_of_view_deg - 79.98).abs() < 0.05);
        assert!((front.position.z - 1.5).abs() < 1e-4);
    }

    #[test]
    fn viewpoints_face_the_object() {
        let obj = sofa();
        let plan = planner().plan(&obj, &agent()).unwrap();
        for vp in &plan.viewpoints {
            let expected = heading_between(vp.position, obj.center);
            assert!((vp.rotation.yaw_deg - expected).abs() < 1e-3);
            let d = vp.position.planar_distance(obj.center);
            assert!((d - 2.5).abs() < 1e-3);
        }
    }

    #[test]
    fn first_viewpoint_is_nearest_to_agent() {
        let plan = planner().plan(&sofa(), &agent()).unwrap();
        assert_eq!(plan.viewpoints[0].kind, ViewpointKind::FrontCenter);
        let start = agent().position;
        let d0 = start.planar_distance(plan.viewpoints[0].position);
        assert!(plan
            .viewpoints
            .iter()
            .all(|vp| start.planar_distance(vp.position) >= d0 - 1e-5));
    }

    #[test]
    fn tall_object_top_view_looks_down() {
        let fridge = ObjectRecord::new(
            "Fridge|1",
            "Fridge",
            Vec3::new(2.0, 0.9, 2.0),
            BoundingSize::new(0.8, 1.8, 0.7),
        );
        let plan = planner().plan(&fridge, &agent()).unwrap();
        let top = plan
            .viewpoints
            .iter()
            .find(|vp| vp.kind == ViewpointKind::Top)
            .unwrap();
        assert!((top.position.y - 2.3).abs() < 1e-4);
        assert!(top.rotation.pitch_deg > 0.0);
    }

    #[test]
    fn never_more_than_five_viewpoints() {
        let room_divider = ObjectRecord::new(
            "Shelf|1",
            "Shelf",
            Vec3::new(0.0, 1.0, 5.0),
            BoundingSize::new(4.0, 2.0, 3.0),
        );
        let plan = planner().plan(&room_divider, &agent()).unwrap();
        assert_eq!(plan.viewpoints.len(), 5);
    }

    #[test]
    fn invalid_geometry_is_rejected_and_defaulted() {
        let broken = ObjectRecord::new("Box|1", "Box", Vec3::new(1.0, 0.0, 1.0), BoundingSize::new(-1.0, 1.0, 1.0));
        assert!(planner().plan(&broken, &agent()).is_err());

        let plan = planner().plan_or_default(&broken, &agent());
        assert_eq!(plan.viewpoints.len(), 1);
        assert_eq!(plan.viewpoints[0].position, agent().position);
        assert!((plan.viewpoints[0].rotation.yaw_deg - 45.0).abs() < 1e-3);
    }

    #[test]
    fn agent_on_top_of_object_uses_object_yaw() {
        let obj = cup().with_rotation(90.0);
        let on_top = AgentPose::new(obj.center, 0.0);
        let plan = planner().plan(&obj, &on_top).unwrap();
        let vp = plan.viewpoints[0];
        // Placed along the object's own heading (+x).
        assert!((vp.position.x - (obj.center.x + 1.0)).abs() < 1e-4);
    }

    // ── Execution ───────────────────────────────────────────────────────────

    fn plan_with(n: usize) -> ObservationStrategy {
        let vp = Viewpoint {
            kind: ViewpointKind::FrontCenter,
            position: Vec3::zero(),
            rotation: ViewRotation::default(),
            field_of_view_deg: 60.0,
        };
        ObservationStrategy {
            object_id: "Obj|1".into(),
            kind: ObservationKind::MultiView,
            viewpoints: vec![vp; n],
            target_coverage: 0.85,
        }
    }

    #[test]
    fn stops_early_at_target() {
        let mut nav = Scripted {
            steps: vec![Some(0.5), Some(0.4), Some(0.3)],
            calls: 0,
        };
        let report = planner().execute(&plan_with(3), &mut nav);
        assert_eq!(report.status, ObservationStatus::TargetReached);
        assert_eq!(nav.calls, 2);
        assert_eq!(report.visited, vec![0, 1]);
    }

    #[test]
    fn failed_viewpoints_are_skipped_not_retried() {
        let mut nav = Scripted {
            steps: vec![None, Some(0.3), None, Some(0.2)],
            calls: 0,
        };
        let report = planner().execute(&plan_with(4), &mut nav);
        assert_eq!(nav.calls, 4);
        assert_eq!(report.status, ObservationStatus::Exhausted);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].viewpoint_index, 0);
        assert_eq!(report.failures[1].viewpoint_index, 2);
        assert!((report.coverage - 0.5).abs() < 1e-6);
    }

    #[test]
    fn all_failures_report_strategy_failed() {
        let mut nav = Scripted {
            steps: vec![None, None],
            calls: 0,
        };
        let report = planner().execute(&plan_with(2), &mut nav);
        assert_eq!(report.status, ObservationStatus::StrategyFailed);
        assert_eq!(report.coverage, 0.0);
        assert_eq!(report.status.as_str(), "strategy_failed");
    }

    #[test]
    fn coverage_trace_is_bounded_and_monotonic() {
        let mut nav = Scripted {
            steps: vec![Some(0.2), Some(-0.5), Some(0.0), Some(0.1), Some(0.05)],
            calls: 0,
        };
        let report = planner().execute(&plan_with(5), &mut nav);
        assert_eq!(report.coverage_trace.len(), 5);
        assert!(report.coverage_trace.windows(2).all(|w| w[1] >= w[0]));
        assert!(report.coverage <= 1.0);
        assert_eq!(report.status, ObservationStatus::Exhausted);
    }

    #[test]
    fn face_navigator_covers_sofa_from_plan() {
        let obj = sofa();
        let plan = planner().plan(&obj, &agent()).unwrap();
        let mut nav = FaceCoverageNavigator::new(&obj);
        let report = planner().execute(&plan, &mut nav);
        assert!(report.coverage > 0.0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn face_navigator_blocks_kind() {
        let obj = sofa();
        let plan = planner().plan(&obj, &agent()).unwrap();
        let mut nav = FaceCoverageNavigator::new(&obj).block(ViewpointKind::FrontCenter);
        let report = planner().execute(&plan, &mut nav);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ViewpointKind::FrontCenter);
    }
}
