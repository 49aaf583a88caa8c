//! Coverage bookkeeping.
//!
//! [`CoverageAccumulator`] sums per-viewpoint coverage increments without
//! ever leaving `[0, 1]`. [`FaceCoverageModel`] estimates those increments
//! from an axis-aligned bounding box: a face counts as seen once an eye
//! position lies strictly outside its plane, and coverage is the seen share
//! of the box's surface area (the bottom face, resting on its support, is
//! never counted).

use spatial_types::{BoundingSize, ObjectRecord, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// CoverageAccumulator
// ────────────────────────────────────────────────────────────────────────────

/// Running coverage total for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageAccumulator {
    target: f32,
    total: f32,
    trace: Vec<f32>,
}

impl CoverageAccumulator {
    pub fn new(target: f32) -> Self {
        Self {
            target: target.clamp(0.0, 1.0),
            total: 0.0,
            trace: Vec::new(),
        }
    }

    /// Add one viewpoint's increment and return the new total.
    ///
    /// Non-finite or negative increments count as zero; the total is capped
    /// at `1.0`.
    pub fn add(&mut self, increment: f32) -> f32 {
        let inc = if increment.is_finite() {
            increment.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.total = (self.total + inc).min(1.0);
        self.trace.push(self.total);
        self.total
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn reached(&self) -> bool {
        self.total >= self.target
    }

    /// Total after each [`add`][Self::add], in call order.
    pub fn trace(&self) -> &[f32] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<f32> {
        self.trace
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FaceCoverageModel
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxFace {
    PosX,
    NegX,
    Top,
    PosZ,
    NegZ,
}

const FACES: [BoxFace; 5] = [
    BoxFace::PosX,
    BoxFace::NegX,
    BoxFace::Top,
    BoxFace::PosZ,
    BoxFace::NegZ,
];

/// Face-visibility coverage estimate for one axis-aligned box.
#[derive(Debug, Clone)]
pub struct FaceCoverageModel {
    center: Vec3,
    size: BoundingSize,
    seen: [bool; 5],
}

impl FaceCoverageModel {
    pub fn new(center: Vec3, size: BoundingSize) -> Self {
        Self {
            center,
            size,
            seen: [false; 5],
        }
    }

    pub fn for_object(obj: &ObjectRecord) -> Self {
        Self::new(obj.center, obj.bounding_size)
    }

    fn area(&self, face: BoxFace) -> f32 {
        let s = self.size;
        match face {
            BoxFace::PosX | BoxFace::NegX => s.y * s.z,
            BoxFace::Top => s.x * s.z,
            BoxFace::PosZ | BoxFace::NegZ => s.x * s.y,
        }
    }

    fn counted_area(&self) -> f32 {
        FACES.iter().map(|&f| self.area(f)).sum()
    }

    /// Faces whose outward side `eye` is on.
    pub fn visible_faces(&self, eye: Vec3) -> Vec<BoxFace> {
        let c = self.center;
        let h = Vec3::new(self.size.x / 2.0, self.size.y / 2.0, self.size.z / 2.0);
        FACES
            .iter()
            .copied()
            .filter(|face| match face {
                BoxFace::PosX => eye.x > c.x + h.x,
                BoxFace::NegX => eye.x < c.x - h.x,
                BoxFace::Top => eye.y > c.y + h.y,
                BoxFace::PosZ => eye.z > c.z + h.z,
                BoxFace::NegZ => eye.z < c.z - h.z,
            })
            .collect()
    }

    /// Coverage `eye` would add without recording it.
    pub fn face_increment(&self, eye: Vec3) -> f32 {
        let denom = self.counted_area();
        if denom <= 0.0 {
            return 0.0;
        }
        let fresh: f32 = self
            .visible_faces(eye)
            .into_iter()
            .filter(|&f| !self.seen[face_slot(f)])
            .map(|f| self.area(f))
            .sum();
        fresh / denom
    }

    /// Record a view from `eye` and return the coverage it added.
    pub fn observe(&mut self, eye: Vec3) -> f32 {
        let inc = self.face_increment(eye);
        for face in self.visible_faces(eye) {
            self.seen[face_slot(face)] = true;
        }
        inc
    }

    /// Share of the counted surface seen so far.
    pub fn coverage(&self) -> f32 {
        let denom = self.counted_area();
        if denom <= 0.0 {
            return 0.0;
        }
        FACES
            .iter()
            .filter(|&&f| self.seen[face_slot(f)])
            .map(|&f| self.area(f))
            .sum::<f32>()
            / denom
    }
}

fn face_slot(face: BoxFace) -> usize {
    match face {
        BoxFace::PosX => 0,
        BoxFace::NegX => 1,
        BoxFace::Top => 2,
        BoxFace::PosZ => 3,
        BoxFace::NegZ => 4,
    }
}
