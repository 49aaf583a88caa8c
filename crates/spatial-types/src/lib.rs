//! `spatial-types` – shared data model for the spatial disambiguation and
//! adaptive observation engine.
//!
//! Everything that crosses a crate boundary lives here: scene objects, parsed
//! instruction constraints, scoring results, observation plans and the
//! engine-wide error taxonomy.
//!
//! # Modules
//!
//! - [`config`] – [`EngineConfig`][config::EngineConfig]: every tunable
//!   threshold with its documented default.
//! - [`scene`] – [`SceneSnapshot`][scene::SceneSnapshot]: per-frame arena of
//!   [`ObjectRecord`]s with an id index and a type → ids index.

pub mod config;
pub mod scene;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::EngineConfig;
pub use scene::SceneSnapshot;

// ────────────────────────────────────────────────────────────────────────────
// Geometry primitives
// ────────────────────────────────────────────────────────────────────────────

/// A point or offset in the simulator's world frame.
///
/// The world is Y-up: `x`/`z` span the floor plane and `y` is height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Distance measured on the floor plane (ignores height).
    pub fn planar_distance(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// True when every component is a finite number.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Extent of an object's bounding box along the world axes (metres).
///
/// `x` is width, `y` is height, `z` is depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSize {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl BoundingSize {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn width(&self) -> f32 {
        self.x
    }

    pub fn height(&self) -> f32 {
        self.y
    }

    pub fn depth(&self) -> f32 {
        self.z
    }

    pub fn max_dimension(&self) -> f32 {
        self.x.max(self.y).max(self.z)
    }

    pub fn min_dimension(&self) -> f32 {
        self.x.min(self.y).min(self.z)
    }
}

/// The agent's pose: floor position plus yaw.
///
/// Yaw follows the simulator convention: degrees, `0` faces `+z`, positive
/// values turn clockwise when seen from above (towards `+x`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentPose {
    pub position: Vec3,
    pub yaw_deg: f32,
}

impl AgentPose {
    pub fn new(position: Vec3, yaw_deg: f32) -> Self {
        Self { position, yaw_deg }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObjectRecord
// ────────────────────────────────────────────────────────────────────────────

/// One simulation-frame snapshot of a physical object instance.
///
/// `id` is unique and stable across frames; `object_type` is a category name
/// shared by every instance of that category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub id: String,
    pub object_type: String,
    pub center: Vec3,
    pub bounding_size: BoundingSize,
    /// Yaw in degrees, `[0, 360)`.
    #[serde(default)]
    pub rotation_y: f32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub distance_to_agent: f32,
    /// Ids of the objects this receptacle holds.
    #[serde(default)]
    pub container_of: Vec<String>,
    /// Id of the receptacle holding this object, if any.
    #[serde(default)]
    pub contained_by: Option<String>,
    /// Interaction kinds already performed on this instance (e.g. `"pickup"`).
    #[serde(default)]
    pub interaction_history: BTreeSet<String>,
}

fn default_visible() -> bool {
    true
}

impl ObjectRecord {
    /// Create a visible, free-standing record with an empty history.
    pub fn new(
        id: impl Into<String>,
        object_type: impl Into<String>,
        center: Vec3,
        bounding_size: BoundingSize,
    ) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            center,
            bounding_size,
            rotation_y: 0.0,
            visible: true,
            distance_to_agent: 0.0,
            container_of: Vec::new(),
            contained_by: None,
            interaction_history: BTreeSet::new(),
        }
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance_to_agent = distance;
        self
    }

    pub fn with_rotation(mut self, rotation_y: f32) -> Self {
        self.rotation_y = rotation_y;
        self
    }

    pub fn contained_in(mut self, container_id: impl Into<String>) -> Self {
        self.contained_by = Some(container_id.into());
        self
    }

    pub fn holding(mut self, ids: &[&str]) -> Self {
        self.container_of = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_interaction(mut self, kind: impl Into<String>) -> Self {
        self.interaction_history.insert(kind.into());
        self
    }

    /// True when the type matches `object_type`, ignoring ASCII case.
    pub fn is_type(&self, object_type: &str) -> bool {
        self.object_type.eq_ignore_ascii_case(object_type)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Instruction constraints
// ────────────────────────────────────────────────────────────────────────────

/// Spatial direction or proximity word extracted from an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Front,
    Back,
    Near,
    Far,
    /// No usable directional signal (absent or contradictory).
    #[default]
    None,
}

impl Direction {
    /// The direction that contradicts this one, if any.
    pub fn opposite(self) -> Option<Direction> {
        match self {
            Direction::Left => Some(Direction::Right),
            Direction::Right => Some(Direction::Left),
            Direction::Front => Some(Direction::Back),
            Direction::Back => Some(Direction::Front),
            Direction::Near => Some(Direction::Far),
            Direction::Far => Some(Direction::Near),
            Direction::None => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Front => "front",
            Direction::Back => "back",
            Direction::Near => "near",
            Direction::Far => "far",
            Direction::None => "none",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordinal reference such as "the second book" or "the last one".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordinal {
    First,
    Last,
    /// 1-based index.
    Index(usize),
}

impl Ordinal {
    /// Resolve to a 0-based position in a list of `len` items.
    ///
    /// Returns `None` when the ordinal points past the end of the list.
    pub fn position(self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self {
            Ordinal::First => Some(0),
            Ordinal::Last => Some(len - 1),
            Ordinal::Index(n) if n >= 1 && n <= len => Some(n - 1),
            Ordinal::Index(_) => None,
        }
    }
}

/// Preference regarding instances the agent has already interacted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateHint {
    /// "another", "the other one" – prefer untouched instances.
    Fresh,
    /// "the same one", "again" – prefer instances already handled.
    Revisit,
}

/// Conjunction of constraints parsed from one instruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialConstraint {
    pub direction: Direction,
    /// Landmark category mentioned alongside a proximity word (lowercase).
    pub landmark_type: Option<String>,
    /// Receptacle category the target sits on or in (lowercase).
    pub container_type: Option<String>,
    pub ordinal: Option<Ordinal>,
    pub state: Option<StateHint>,
}

impl SpatialConstraint {
    /// True when the constraint carries no disambiguating information.
    pub fn is_empty(&self) -> bool {
        self.direction == Direction::None
            && self.landmark_type.is_none()
            && self.container_type.is_none()
            && self.ordinal.is_none()
            && self.state.is_none()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scoring and resolution
// ────────────────────────────────────────────────────────────────────────────

/// Per-candidate scoring result. Created fresh for every resolution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub object_id: String,
    /// Final score in `[0, 1]`.
    pub total_score: f32,
    /// Named criterion → contribution.
    pub component_scores: BTreeMap<String, f32>,
    pub used_in_history: bool,
}

/// How a [`Resolution::Selected`] outcome was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Only one candidate was available.
    SingleCandidate,
    /// The instruction's constraints singled out one candidate.
    Constraint,
    /// The composite visibility/proximity/accessibility/context score was
    /// confident enough.
    Composite,
    /// Every candidate was malformed; the closest visible one was taken.
    Fallback,
}

/// Why the resolver could not pick a candidate on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationReason {
    /// The instruction carried no disambiguating information.
    NoContext,
    /// Constraints or composite scores did not separate the candidates.
    LowConfidence,
}

impl ClarificationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ClarificationReason::NoContext => "no_context",
            ClarificationReason::LowConfidence => "low_confidence",
        }
    }
}

impl fmt::Display for ClarificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one disambiguation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Selected {
        object_id: String,
        confidence: f32,
        method: SelectionMethod,
    },
    NeedsClarification {
        /// Candidates ordered best-first (ties by ascending id).
        ranked: Vec<CandidateScore>,
        reason: ClarificationReason,
    },
}

impl Resolution {
    /// The selected id, if the resolution is final.
    pub fn selected_id(&self) -> Option<&str> {
        match self {
            Resolution::Selected { object_id, .. } => Some(object_id),
            Resolution::NeedsClarification { .. } => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observation plans
// ────────────────────────────────────────────────────────────────────────────

/// Whether one viewpoint suffices for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationKind {
    SingleView,
    MultiView,
}

/// Where a viewpoint sits relative to the object's front (the side facing
/// the agent when the plan was made).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewpointKind {
    FrontCenter,
    FrontLeft,
    FrontRight,
    SideLeft,
    SideRight,
    Top,
}

/// Camera orientation at a viewpoint, in degrees.
///
/// `pitch_deg` is positive when looking down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRotation {
    pub yaw_deg: f32,
    pub pitch_deg: f32,
}

/// A `(position, rotation, field-of-view)` triple to observe an object from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub kind: ViewpointKind,
    pub position: Vec3,
    pub rotation: ViewRotation,
    pub field_of_view_deg: f32,
}

/// Ordered observation plan for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationStrategy {
    pub object_id: String,
    pub kind: ObservationKind,
    /// Visit order; executing out of order voids the coverage guarantee.
    pub viewpoints: Vec<Viewpoint>,
    pub target_coverage: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Engine-wide error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpatialError {
    #[error("Invalid geometry for {object_id}: {reason}")]
    InvalidGeometry { object_id: String, reason: String },

    #[error("No candidates supplied for type {object_type:?}")]
    NoCandidates { object_type: String },

    #[error("Duplicate object id in scene snapshot: {0}")]
    DuplicateObjectId(String),

    #[error("Unknown object id: {0}")]
    UnknownObject(String),

    #[error("A clarification episode is already in progress")]
    EpisodeInProgress,

    #[error("Invalid dialogue transition: cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },
}
