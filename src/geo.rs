// Streaming geometry for course matching: great-circle distance and
// point-to-polyline distance in a local planar frame.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.;

/// A WGS84 coordinate in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.).sin().powi(2);
    2. * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Shortest distance in meters from `p` to the course polyline.
///
/// The polyline and `p` are projected into a flat frame centered at `p`
/// (longitude scaled by `cos(lat)` to correct for meridian convergence), then
/// the minimum over all point-to-segment distances is taken. Runs in O(n)
/// with no allocation, so it can be re-evaluated on every incoming sample.
///
/// An empty polyline yields `f64::INFINITY`: the caller cannot evaluate
/// off-course distance and must decide what that means. A single-point
/// polyline degenerates to the haversine point distance.
pub fn nearest_distance_m(polyline: &[GeoPoint], p: GeoPoint) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [only] => haversine_m(*only, p),
        _ => {
            let cos_lat = p.lat.to_radians().cos();
            let project = |q: &GeoPoint| {
                (
                    (q.lng - p.lng).to_radians() * cos_lat * EARTH_RADIUS_M,
                    (q.lat - p.lat).to_radians() * EARTH_RADIUS_M,
                )
            };

            let mut min_dist = f64::INFINITY;
            let mut prev = project(&polyline[0]);
            for q in &polyline[1..] {
                let cur = project(q);
                min_dist = min_dist.min(origin_to_segment(prev, cur));
                prev = cur;
            }
            min_dist
        }
    }
}

/// Distance from the origin to the segment `a`-`b`, closed form with the
/// parametric projection clamped to [0, 1].
fn origin_to_segment(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (ax, ay) = a;
    let (bx, by) = b;
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0. {
        return ax.hypot(ay);
    }
    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0., 1.);
    (ax + t * dx).hypot(ay + t * dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_haversine_one_degree_longitude_at_equator() {
        let a = GeoPoint::new(0., 0.);
        let b = GeoPoint::new(0., 1.);
        let dist = haversine_m(a, b);
        // one degree of longitude at the equator is ~111.2 km
        assert!((dist - 111_195.).abs() < 100., "got {dist}");
    }

    #[test]
    fn test_haversine_zero_for_identical_points() {
        let p = GeoPoint::new(37.5, 127.);
        assert_eq!(haversine_m(p, p), 0.);
    }

    #[test]
    fn test_nearest_distance_empty_polyline_is_infinite() {
        assert_eq!(nearest_distance_m(&[], GeoPoint::new(0., 0.)), f64::INFINITY);
    }

    #[test]
    fn test_nearest_distance_single_point_is_haversine() {
        let line = [GeoPoint::new(0., 0.)];
        let p = GeoPoint::new(0., 0.001);
        assert_eq!(nearest_distance_m(&line, p), haversine_m(line[0], p));
    }

    #[test]
    fn test_nearest_distance_zero_on_segment() {
        let line = [GeoPoint::new(0., 0.), GeoPoint::new(0., 0.001)];
        let on_segment = GeoPoint::new(0., 0.0005);
        assert!(nearest_distance_m(&line, on_segment) < 1e-6);
    }

    #[test]
    fn test_nearest_distance_perpendicular_offset() {
        // course runs north along lng=0, runner is ~111 m east of the middle
        let line = [GeoPoint::new(0., 0.), GeoPoint::new(0.01, 0.)];
        let p = GeoPoint::new(0.005, 0.001);
        let dist = nearest_distance_m(&line, p);
        assert!((dist - 111.2).abs() < 1., "got {dist}");
    }

    #[test]
    fn test_nearest_distance_clamps_to_endpoint() {
        // point beyond the end of the segment measures to the endpoint, not
        // the infinite line
        let line = [GeoPoint::new(0., 0.), GeoPoint::new(0., 0.001)];
        let past_end = GeoPoint::new(0., 0.002);
        let expected = haversine_m(line[1], past_end);
        let dist = nearest_distance_m(&line, past_end);
        assert!((dist - expected).abs() < 0.5, "got {dist}, expected {expected}");
    }

    #[test]
    fn test_nearest_distance_degenerate_zero_length_segment() {
        let line = [GeoPoint::new(0., 0.), GeoPoint::new(0., 0.)];
        let p = GeoPoint::new(0., 0.001);
        let dist = nearest_distance_m(&line, p);
        assert!((dist - haversine_m(line[0], p)).abs() < 0.5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // The physical geometry is fixed: a segment with planar offsets from a
        // base point plus a query point. Rotating and translating the whole
        // frame must not change the measured distance.
        #[test]
        fn prop_nearest_distance_invariant_under_rotation_and_translation(
            base_lat in -60.0f64..60.0,
            base_lng in -179.0f64..179.0,
            ax in -500.0f64..500.0,
            ay in -500.0f64..500.0,
            bx in -500.0f64..500.0,
            by in -500.0f64..500.0,
            px in -500.0f64..500.0,
            py in -500.0f64..500.0,
            angle in 0.0f64..std::f64::consts::TAU,
            shift_lat in -0.5f64..0.5,
            shift_lng in -0.5f64..0.5,
        ) {
            let place = |base: GeoPoint, x: f64, y: f64| {
                let lat = base.lat + (y / EARTH_RADIUS_M).to_degrees();
                let lng = base.lng
                    + (x / (EARTH_RADIUS_M * base.lat.to_radians().cos())).to_degrees();
                GeoPoint::new(lat, lng)
            };
            let rotate = |x: f64, y: f64| {
                (x * angle.cos() - y * angle.sin(), x * angle.sin() + y * angle.cos())
            };

            let base = GeoPoint::new(base_lat, base_lng);
            let original = nearest_distance_m(
                &[place(base, ax, ay), place(base, bx, by)],
                place(base, px, py),
            );

            let moved = GeoPoint::new(base_lat + shift_lat, base_lng + shift_lng);
            let (rax, ray) = rotate(ax, ay);
            let (rbx, rby) = rotate(bx, by);
            let (rpx, rpy) = rotate(px, py);
            let transformed = nearest_distance_m(
                &[place(moved, rax, ray), place(moved, rbx, rby)],
                place(moved, rpx, rpy),
            );

            // small-scale geometry, so the flat-earth approximation holds to
            // well under a meter plus a relative term for the curvature error
            let tolerance = 1.0 + original * 0.01;
            prop_assert!(
                (original - transformed).abs() < tolerance,
                "original {original}, transformed {transformed}"
            );
        }

        #[test]
        fn prop_nearest_distance_never_negative(
            lat in -60.0f64..60.0,
            lng in -179.0f64..179.0,
            d_lat in -0.01f64..0.01,
            d_lng in -0.01f64..0.01,
        ) {
            let line = [
                GeoPoint::new(lat, lng),
                GeoPoint::new(lat + d_lat, lng + d_lng),
            ];
            let p = GeoPoint::new(lat + d_lng, lng + d_lat);
            prop_assert!(nearest_distance_m(&line, p) >= 0.);
        }
    }
}
