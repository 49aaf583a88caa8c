//! Floor-plane reference frames.
//!
//! The simulator world is Y-up and left-handed: facing `+z`, `+x` is on the
//! right. A yaw of `0°` faces `+z`; positive yaw turns clockwise (towards
//! `+x`). A [`YawFrame`] is an origin plus such a yaw, and maps world points
//! into a local frame where local `x` is "right" and local `z` is "forward".
//!
//! # Example
//!
//! ```rust
//! use spatial_perception::frame::YawFrame;
//! use spatial_types::Vec3;
//!
//! // Agent at the origin, facing +z.
//! let frame = YawFrame::new(Vec3::zero(), 0.0);
//!
//! // An object one metre ahead and one metre to the right is 45° right.
//! let b = frame.bearing_to(Vec3::new(1.0, 0.0, 1.0));
//! assert!((b - 45.0).abs() < 1e-4);
//! ```

use spatial_types::{AgentPose, ObjectRecord, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Angle helpers
// ────────────────────────────────────────────────────────────────────────────

/// Normalise an angle in degrees into `[-180, 180]`.
pub fn normalize_degrees(deg: f32) -> f32 {
    let mut a = deg % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a < -180.0 {
        a += 360.0;
    }
    a
}

/// Normalise an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(deg: f32) -> f32 {
    let a = deg % 360.0;
    if a < 0.0 { a + 360.0 } else { a }
}

/// World heading (degrees, yaw convention) of the floor-plane direction from
/// `from` towards `to`.
pub fn heading_between(from: Vec3, to: Vec3) -> f32 {
    let dx = to.x - from.x;
    let dz = to.z - from.z;
    wrap_degrees(dx.atan2(dz).to_degrees())
}

/// Unit floor-plane vector for a world heading.
pub fn heading_vector(heading_deg: f32) -> Vec3 {
    let r = heading_deg.to_radians();
    Vec3::new(r.sin(), 0.0, r.cos())
}

// ────────────────────────────────────────────────────────────────────────────
// YawFrame
// ────────────────────────────────────────────────────────────────────────────

/// A reference frame on the floor plane: an origin and a yaw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawFrame {
    pub origin: Vec3,
    pub yaw_deg: f32,
}

impl YawFrame {
    pub fn new(origin: Vec3, yaw_deg: f32) -> Self {
        Self { origin, yaw_deg }
    }

    /// The agent's egocentric frame.
    pub fn from_agent(pose: &AgentPose) -> Self {
        Self::new(pose.position, pose.yaw_deg)
    }

    /// The frame of a reference object (its centre and yaw).
    pub fn from_object(obj: &ObjectRecord) -> Self {
        Self::new(obj.center, obj.rotation_y)
    }

    /// Local forward axis in world coordinates.
    pub fn forward(&self) -> Vec3 {
        heading_vector(self.yaw_deg)
    }

    /// Local right axis in world coordinates.
    pub fn right(&self) -> Vec3 {
        let r = self.yaw_deg.to_radians();
        Vec3::new(r.cos(), 0.0, -r.sin())
    }

    /// Express world point `p` in this frame: `x` right, `y` up, `z` forward.
    pub fn to_local(&self, p: Vec3) -> Vec3 {
        let d = p.sub(self.origin);
        let f = self.forward();
        let r = self.right();
        Vec3::new(d.x * r.x + d.z * r.z, d.y, d.x * f.x + d.z * f.z)
    }

    /// Inverse of [`to_local`][Self::to_local].
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        let f = self.forward();
        let r = self.right();
        Vec3::new(
            self.origin.x + r.x * local.x + f.x * local.z,
            self.origin.y + local.y,
            self.origin.z + r.z * local.x + f.z * local.z,
        )
    }

    /// Signed bearing of `p` in degrees, `[-180, 180]`: positive is to the
    /// right of the frame's forward axis, negative to the left.
    pub fn bearing_to(&self, p: Vec3) -> f32 {
        let local = self.to_local(p);
        if local.x.abs() < f32::EPSILON && local.z.abs() < f32::EPSILON {
            return 0.0;
        }
        normalize_degrees(local.x.atan2(local.z).to_degrees())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
