pub mod segment;
pub mod spline;
pub mod tracker;

pub use segment::{TrackFrame, TrackSegment};
pub use spline::TrackSpline;
pub use tracker::TrackPositionTracker;
