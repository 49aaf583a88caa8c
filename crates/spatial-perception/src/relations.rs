//! Egocentric and allocentric spatial relations.
//!
//! [`SpatialRelationCalculator::relations`] takes a reference frame (the
//! agent's pose or another object's centre and yaw) and reports, for each
//! object, its signed bearing, floor-plane distance, visibility, the
//! landmarks within reach and the receptacle holding it.
//!
//! Relations are recomputed on every call; nothing is cached across frames.

use std::collections::BTreeMap;

use spatial_types::{EngineConfig, ObjectRecord, SceneSnapshot};
use tracing::trace;

use crate::frame::YawFrame;

/// Receptacle categories that enclose their contents rather than support them.
pub const ENCLOSED_CONTAINER_TYPES: &[&str] =
    &["Cabinet", "Drawer", "Fridge", "Microwave", "Safe", "Box"];

/// True when `object_type` encloses what it holds.
pub fn is_enclosed_container(object_type: &str) -> bool {
    ENCLOSED_CONTAINER_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(object_type))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLandmark {
    pub landmark_id: String,
    pub landmark_type: String,
    /// Floor-plane distance from the object.
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentKind {
    /// Resting on an open surface (table, counter, shelf).
    On,
    /// Inside an enclosed receptacle (cabinet, drawer, fridge).
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Containment {
    pub container_id: String,
    pub container_type: String,
    pub kind: ContainmentKind,
}

/// Relation of one object to the reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRecord {
    pub object_id: String,
    /// Signed bearing in `[-180, 180]`; positive is to the right.
    pub bearing_deg: f32,
    /// Floor-plane distance from the frame origin.
    pub distance: f32,
    pub visible: bool,
    /// Landmarks within the configured radius, nearest first.
    pub nearby_landmarks: Vec<NearbyLandmark>,
    pub container: Option<Containment>,
}

impl RelationRecord {
    /// Coarse 90° sector of the bearing: `"front"`, `"right"`, `"back"` or
    /// `"left"`.
    pub fn sector(&self) -> &'static str {
        let b = self.bearing_deg;
        if b.abs() <= 45.0 {
            "front"
        } else if b.abs() >= 135.0 {
            "back"
        } else if b > 0.0 {
            "right"
        } else {
            "left"
        }
    }

    /// True when a nearby landmark's type contains `landmark_type`
    /// (case-insensitive), so `"door"` also matches `"DoorFrame"`.
    pub fn has_landmark(&self, landmark_type: &str) -> bool {
        let needle = landmark_type.to_ascii_lowercase();
        self.nearby_landmarks
            .iter()
            .any(|l| l.landmark_type.to_ascii_lowercase().contains(&needle))
    }

    /// Distance to the nearest landmark matching `landmark_type`.
    pub fn nearest_landmark_distance(&self, landmark_type: &str) -> Option<f32> {
        let needle = landmark_type.to_ascii_lowercase();
        self.nearby_landmarks
            .iter()
            .filter(|l| l.landmark_type.to_ascii_lowercase().contains(&needle))
            .map(|l| l.distance)
            .min_by(f32::total_cmp)
    }
}

/// Computes [`RelationRecord`]s for a set of objects.
#[derive(Debug, Clone)]
pub struct SpatialRelationCalculator {
    landmark_radius: f32,
    landmark_types: Vec<String>,
}

impl SpatialRelationCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            landmark_radius: config.landmark_radius,
            landmark_types: config.landmark_types.clone(),
        }
    }

    /// Relations of every object in `objects` to `frame`, keyed by id.
    ///
    /// Landmarks and containers are looked up in `scene`; an object is never
    /// its own landmark.
    pub fn relations(
        &self,
        frame: &YawFrame,
        objects: &[&ObjectRecord],
        scene: &SceneSnapshot,
    ) -> BTreeMap<String, RelationRecord> {
        objects
            .iter()
            .map(|obj| (obj.id.clone(), self.relation(frame, obj, scene)))
            .collect()
    }

    /// Relation of a single object to `frame`.
    pub fn relation(
        &self,
        frame: &YawFrame,
        obj: &ObjectRecord,
        scene: &SceneSnapshot,
    ) -> RelationRecord {
        let bearing_deg = frame.bearing_to(obj.center);
        let distance = frame.origin.planar_distance(obj.center);

        let mut nearby_landmarks: Vec<NearbyLandmark> = scene
            .landmarks(&self.landmark_types)
            .filter(|l| l.id != obj.id)
            .filter_map(|l| {
                let d = l.center.planar_distance(obj.center);
                (d <= self.landmark_radius).then(|| NearbyLandmark {
                    landmark_id: l.id.clone(),
                    landmark_type: l.object_type.clone(),
                    distance: d,
                })
            })
            .collect();
        nearby_landmarks.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.landmark_id.cmp(&b.landmark_id))
        });

        let container = scene.container_of(&obj.id).map(|c| Containment {
            container_id: c.id.clone(),
            container_type: c.object_type.clone(),
            kind: if is_enclosed_container(&c.object_type) {
                ContainmentKind::In
            } else {
                ContainmentKind::On
            },
        });

        trace!(
            object_id = %obj.id,
            bearing_deg,
            distance,
            landmarks = nearby_landmarks.len(),
            "relation computed"
        );

        RelationRecord {
            object_id: obj.id.clone(),
            bearing_deg,
            distance,
            visible: obj.visible,
            nearby_landmarks,
            container,
        }
    }
}
