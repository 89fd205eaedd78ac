use crate::track::spline::TrackSpline;
use glam::Vec3;
use log::{debug, trace};

/// Steps the incremental search is allowed to take before giving up and
/// doing a full scan. Normal driving never crosses more than one segment
/// per frame; anything beyond a couple of steps means the car teleported.
const MAX_INCREMENTAL_STEPS: usize = 8;

/// A car farther than this from the segment chord did not get there by
/// driving; resets and teleports re-seed the tracker with a full scan.
const MAX_LATERAL_DISTANCE_SQUARED: f32 = 25.0 * 25.0;

/// Incremental car-to-track localization.
///
/// Carries `(segment_index, percent)` from frame to frame so the per-frame
/// query is O(1): the car's projection onto the current segment chord is
/// tested against `[0, 1)` and the index only advances or retreats by
/// single segments. A position the stepping cannot resolve (reset,
/// teleport) falls back to one full [`TrackSpline::locate`] scan.
#[derive(Debug, Default, Copy, Clone)]
pub struct TrackPositionTracker {
    segment_index: usize,
    percent: f32,
}

impl TrackPositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart tracking from a known reference, e.g. after the car has been
    /// set back onto the start position.
    pub fn reset_to(&mut self, segment_index: usize, percent: f32) {
        self.segment_index = segment_index;
        self.percent = percent.clamp(0.0, 1.0 - f32::EPSILON);
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }

    /// Update the tracked reference for the new car position and return it.
    pub fn update(&mut self, spline: &TrackSpline, car_position: Vec3) -> (usize, f32) {
        let count = spline.segment_count();
        self.segment_index %= count;

        for _ in 0..MAX_INCREMENTAL_STEPS {
            let projection = spline.chord_projection(self.segment_index, car_position);

            if projection >= 1.0 {
                // Advanced past the current segment, wrap forward.
                self.segment_index = (self.segment_index + 1) % count;
            } else if projection < 0.0 {
                // Regressed before the current segment, wrap backward.
                self.segment_index = (self.segment_index + count - 1) % count;
            } else {
                let closest = spline
                    .evaluate(self.segment_index, projection)
                    .position;
                if closest.distance_squared(car_position) > MAX_LATERAL_DISTANCE_SQUARED {
                    // In-range projection but the car is nowhere near the
                    // segment, e.g. a sideways reset.
                    break;
                }

                self.percent = projection.min(1.0 - f32::EPSILON);
                trace!(
                    "track position: segment {} percent {:.3}",
                    self.segment_index, self.percent
                );
                return (self.segment_index, self.percent);
            }
        }

        // The car moved too far for incremental stepping (teleport/reset).
        // One full scan re-seeds the tracker, then stepping resumes.
        debug!(
            "incremental track search did not converge near segment {}, falling back to full scan",
            self.segment_index
        );
        let (segment_index, percent) = spline.locate(car_position);
        self.segment_index = segment_index;
        self.percent = percent;
        (self.segment_index, self.percent)
    }
}

#[cfg(test)]
mod tests {
    use super::TrackPositionTracker;
    use crate::track::spline::TrackSpline;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn square_track() -> TrackSpline {
        TrackSpline::from_points(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(10.0, 10.0, 0.0),
                Vec3::new(0.0, 10.0, 0.0),
            ],
            &[8.0; 4],
        )
        .unwrap()
    }

    #[test]
    fn monotonic_forward_motion_matches_full_scan() {
        let track = square_track();
        let mut tracker = TrackPositionTracker::new();

        // Drive one and a half laps in small steps.
        for step in 0..240 {
            let distance = step as f32 * 0.25;
            let position = track.frame_at_distance(distance).position;

            let (segment, percent) = tracker.update(&track, position);
            let (scan_segment, scan_percent) = track.locate(position);

            assert_eq!(segment, scan_segment, "diverged at distance {}", distance);
            assert_relative_eq!(percent, scan_percent, epsilon = 1e-3);
        }
    }

    #[test]
    fn car_at_distance_25_reports_segment_2_percent_half() {
        let track = square_track();
        let mut tracker = TrackPositionTracker::new();

        for step in 0..=100 {
            let position = track.frame_at_distance(step as f32 * 0.25).position;
            tracker.update(&track, position);
        }

        assert_eq!(tracker.segment_index(), 2);
        assert_relative_eq!(tracker.percent(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn backwards_motion_retreats_across_segments() {
        let track = square_track();
        let mut tracker = TrackPositionTracker::new();
        tracker.reset_to(2, 0.5);

        // Slightly off the road edge, halfway along the previous segment.
        let (segment, percent) = tracker.update(&track, Vec3::new(11.0, 5.0, 0.0));

        assert_eq!(segment, 1);
        assert_relative_eq!(percent, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn wraps_from_last_segment_back_to_first() {
        let track = square_track();
        let mut tracker = TrackPositionTracker::new();
        tracker.reset_to(3, 0.9);

        let (segment, _) = tracker.update(&track, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(segment, 0);
    }

    #[test]
    fn teleport_triggers_full_scan_fallback() {
        // Side length 100, so the far side is well beyond the lateral limit.
        let track = TrackSpline::from_points(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(100.0, 0.0, 0.0),
                Vec3::new(100.0, 100.0, 0.0),
                Vec3::new(0.0, 100.0, 0.0),
            ],
            &[8.0; 4],
        )
        .unwrap();
        let mut tracker = TrackPositionTracker::new();
        tracker.reset_to(0, 0.1);

        // Teleport to the opposite side of the loop; the projection onto the
        // current segment stays in range, only the fallback scan can resolve it.
        let (segment, percent) = tracker.update(&track, Vec3::new(50.0, 100.0, 0.0));

        assert_eq!(segment, 2);
        assert_relative_eq!(percent, 0.5, epsilon = 1e-2);
    }
}
