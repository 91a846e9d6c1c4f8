// Partitions the telemetry buffer into renderable polyline segments.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::telemetry::Telemetry;

/// What a segment represents on the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentRole {
    /// The runner's own recorded path
    OwnRun,
    /// The attached course polyline
    CourseReference,
    /// The replayed ghost path
    Ghost,
}

/// A maximal contiguous run of telemetry sharing the same `is_running` flag.
///
/// Only the most recently opened segment may grow; closed segments are never
/// mutated. Rendering consumers draw each segment as one polyline, styled by
/// role and running flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Segment {
    pub points: Vec<GeoPoint>,
    pub is_running: bool,
    pub role: SegmentRole,
}

impl Segment {
    pub fn new(is_running: bool, role: SegmentRole) -> Self {
        Self {
            points: Vec::new(),
            is_running,
            role,
        }
    }

    pub fn push_point(&mut self, point: GeoPoint) {
        // skip degenerate zero-length sub-segments
        if self.points.last() != Some(&point) {
            self.points.push(point);
        }
    }
}

/// Appends one telemetry record to the segment partition.
///
/// If the open segment's flag matches, the point extends it (unless the
/// coordinates repeat the segment tail). On a flag flip the open segment is
/// closed and a new one starts with the incoming flag. O(1) amortized; the
/// partition always covers the ingested telemetry with no gaps or overlaps.
/// Records without a GPS fix still drive flag transitions but contribute no
/// renderable point.
pub fn append(segments: &mut Vec<Segment>, telemetry: &Telemetry, role: SegmentRole) {
    let needs_new = match segments.last() {
        Some(open) => open.is_running != telemetry.is_running,
        None => true,
    };
    if needs_new {
        segments.push(Segment::new(telemetry.is_running, role));
    }
    if telemetry.has_position()
        && let Some(open) = segments.last_mut()
    {
        open.push_point(telemetry.position());
    }
}
