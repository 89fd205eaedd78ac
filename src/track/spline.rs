use crate::track::segment::{TrackFrame, TrackSegment, orthonormal_basis};
use anyhow::{Result, ensure};
use glam::Vec3;

/// Largest representable percent below 1.0; percents live in `[0, 1)`.
const MAX_PERCENT: f32 = 1.0 - f32::EPSILON;

/// Segments shorter than this are treated as degenerate: projections onto
/// them clamp to 0 instead of dividing by (almost) zero.
const MIN_SEGMENT_LENGTH_SQUARED: f32 = 1.0e-6;

/// Ordered sequence of track segments forming a closed loop.
///
/// All localization answers are `(segment_index, percent)` pairs with
/// `percent` in `[0, 1)`. [`TrackSpline::locate`] is a full O(n) scan and is
/// only meant for cold starts; per-frame queries go through
/// [`crate::track::TrackPositionTracker`] instead.
pub struct TrackSpline {
    segments: Vec<TrackSegment>,
    length: f32,
}

impl TrackSpline {
    /// Build the spline from ordered control points and per-point road
    /// widths. The loop closes implicitly from the last point back to the
    /// first, forward vectors come from the neighbouring points and the up
    /// vectors start as world +Z re-orthogonalized against them.
    pub fn from_points(points: &[Vec3], road_widths: &[f32]) -> Result<Self> {
        ensure!(points.len() >= 3, "a closed track needs at least 3 control points, got {}", points.len());
        ensure!(
            road_widths.len() == points.len(),
            "road width count {} does not match control point count {}",
            road_widths.len(),
            points.len()
        );

        let count = points.len();
        let mut segments = Vec::with_capacity(count);
        let mut distance = 0.0f32;

        for i in 0..count {
            let prev = points[(i + count - 1) % count];
            let next = points[(i + 1) % count];

            // Central difference keeps the frame smooth across kinks.
            let (forward, right, up) = orthonormal_basis(next - prev, Vec3::Z);

            segments.push(TrackSegment {
                position: points[i],
                forward,
                right,
                up,
                road_width: road_widths[i],
                distance_from_start: distance,
            });

            distance += points[i].distance(next);
        }

        Ok(Self {
            segments,
            length: distance,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    /// Total arc length of the closed loop.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Start frame of the track, where the car gets placed for a new race.
    pub fn start_frame(&self) -> TrackFrame {
        self.evaluate(0, 0.0)
    }

    /// Interpolated road frame between `segment_index` and its successor.
    /// `percent` is clamped to `[0, 1)`, the index wraps modulo the segment
    /// count (closed loop).
    pub fn evaluate(&self, segment_index: usize, percent: f32) -> TrackFrame {
        let percent = percent.clamp(0.0, MAX_PERCENT);
        let a = &self.segments[segment_index % self.segments.len()];
        let b = &self.segments[(segment_index + 1) % self.segments.len()];

        let (forward, right, up) =
            orthonormal_basis(a.forward.lerp(b.forward, percent), a.up.lerp(b.up, percent));

        TrackFrame {
            position: a.position.lerp(b.position, percent),
            forward,
            right,
            up,
            road_width: a.road_width + (b.road_width - a.road_width) * percent,
            next_road_width: b.road_width,
        }
    }

    /// Road frame at a distance from the track start, wrapped modulo the
    /// track length. Used for the menu background camera and for placing
    /// scenery at "every n meters" intervals.
    pub fn frame_at_distance(&self, distance: f32) -> TrackFrame {
        let (segment_index, percent) = self.locate_distance(distance);
        self.evaluate(segment_index, percent)
    }

    /// Maps a distance from start to `(segment_index, percent)` via binary
    /// search over the cumulative segment distances.
    pub fn locate_distance(&self, distance: f32) -> (usize, f32) {
        let distance = if self.length > 0.0 {
            distance.rem_euclid(self.length)
        } else {
            0.0
        };

        // partition_point yields the first segment *past* the distance.
        let index = self
            .segments
            .partition_point(|segment| segment.distance_from_start <= distance)
            .saturating_sub(1);

        let segment_length = self.segment_length(index);
        let percent = if segment_length * segment_length > MIN_SEGMENT_LENGTH_SQUARED {
            (distance - self.segments[index].distance_from_start) / segment_length
        } else {
            0.0
        };

        (index, percent.clamp(0.0, MAX_PERCENT))
    }

    /// Inverse of [`Self::locate_distance`]: distance from start of a
    /// `(segment_index, percent)` reference.
    pub fn distance_at(&self, segment_index: usize, percent: f32) -> f32 {
        let index = segment_index % self.segments.len();
        self.segments[index].distance_from_start + self.segment_length(index) * percent.clamp(0.0, MAX_PERCENT)
    }

    /// Full linear scan for the segment closest to `point`. Returns a
    /// locally-consistent `(segment_index, percent)`; the result is only
    /// meant to seed incremental tracking, not to be globally optimal for
    /// self-overlapping layouts (bridges).
    pub fn locate(&self, point: Vec3) -> (usize, f32) {
        let mut best = (0, 0.0);
        let mut best_distance_squared = f32::INFINITY;

        for index in 0..self.segments.len() {
            let percent = self.chord_projection(index, point).clamp(0.0, MAX_PERCENT);
            let closest = self.segments[index]
                .position
                .lerp(self.segments[(index + 1) % self.segments.len()].position, percent);
            let distance_squared = closest.distance_squared(point);

            if distance_squared < best_distance_squared {
                best_distance_squared = distance_squared;
                best = (index, percent);
            }
        }

        best
    }

    /// Unclamped projection of `point` onto the chord of `segment_index`.
    /// Values outside `[0, 1)` mean the point lies past the segment bounds.
    /// Degenerate (zero length) chords project to 0.
    pub(crate) fn chord_projection(&self, segment_index: usize, point: Vec3) -> f32 {
        let a = &self.segments[segment_index % self.segments.len()];
        let b = &self.segments[(segment_index + 1) % self.segments.len()];
        let chord = b.position - a.position;

        let length_squared = chord.length_squared();
        if length_squared <= MIN_SEGMENT_LENGTH_SQUARED {
            return 0.0;
        }

        (point - a.position).dot(chord) / length_squared
    }

    /// Evenly spaced checkpoint segment indices, roughly every `spacing`
    /// meters, excluding the start segment itself.
    pub fn checkpoint_segment_positions(&self, spacing: f32) -> Vec<usize> {
        let mut checkpoints = Vec::new();
        let mut next_distance = spacing;

        for (index, segment) in self.segments.iter().enumerate().skip(1) {
            if segment.distance_from_start >= next_distance {
                checkpoints.push(index);
                next_distance = segment.distance_from_start + spacing;
            }
        }

        checkpoints
    }

    fn segment_length(&self, segment_index: usize) -> f32 {
        let a = &self.segments[segment_index % self.segments.len()];
        let b = &self.segments[(segment_index + 1) % self.segments.len()];
        a.position.distance(b.position)
    }
}
