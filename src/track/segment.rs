use glam::{Affine3A, Mat3, Vec3};

/// One element of the piecewise track spline. Segments are ordered
/// monotonically by `distance_from_start` and the track is a closed loop,
/// so the segment after the last one is the first one again.
#[derive(Debug, Clone)]
pub struct TrackSegment {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub road_width: f32,
    /// Cumulative arc length from the track start to this segment.
    pub distance_from_start: f32,
}

/// Interpolated local road frame at an arbitrary point along the track.
/// `forward`/`right`/`up` are mutually orthogonal unit vectors.
#[derive(Debug, Copy, Clone)]
pub struct TrackFrame {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub road_width: f32,
    pub next_road_width: f32,
}

impl TrackFrame {
    /// Frame as an affine transform, with right/forward/up as the basis
    /// columns. This is what the car renderer and the ghost car consume.
    pub fn matrix(&self) -> Affine3A {
        Affine3A::from_mat3_translation(
            Mat3::from_cols(self.right, self.forward, self.up),
            self.position,
        )
    }
}

/// Builds an orthonormal (forward, right, up) basis from a forward and an
/// approximate up vector. Neither input needs to be unit length; degenerate
/// inputs fall back to the world axes instead of propagating NaN.
pub fn orthonormal_basis(forward: Vec3, up_hint: Vec3) -> (Vec3, Vec3, Vec3) {
    let forward = forward.try_normalize().unwrap_or(Vec3::Y);
    let right = forward
        .cross(up_hint)
        .try_normalize()
        // up_hint (anti)parallel to forward, pick any perpendicular.
        .unwrap_or_else(|| forward.cross(Vec3::X).try_normalize().unwrap_or(Vec3::X));
    let up = right.cross(forward).normalize();
    (forward, right, up)
}
