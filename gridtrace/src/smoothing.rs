// Contour smoothing module
// Douglas-Peucker simplification that removes pixel jitter from traced borders

use gridtrace_common::{Contour, PixelPoint};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use tracing::debug;

use crate::config::NormalizeConfig;

/// Simplify a traced border into a low-noise closed polygon
/// Tolerance scales with the contour perimeter; the point count never grows
pub fn smooth_contour(contour: &Contour, config: &NormalizeConfig) -> Contour {
    let epsilon = config.epsilon_rate * contour.perimeter();
    let simplified = approximate_closed(contour.points(), epsilon);

    match Contour::new(simplified) {
        Some(smoothed) if smoothed.len() <= contour.len() => {
            debug!(
                "Smoothed contour: {} -> {} points (epsilon {:.3})",
                contour.len(),
                smoothed.len(),
                epsilon
            );
            smoothed
        }
        _ => {
            debug!("Smoothing collapsed the contour, keeping {} points", contour.len());
            contour.clone()
        }
    }
}

/// Closed-curve Douglas-Peucker
///
/// The curve is cut at the point farthest from its start and each half is
/// simplified as an open polyline, so neither half has coincident end points.
pub(crate) fn approximate_closed(points: &[PixelPoint], epsilon: f64) -> Vec<PixelPoint> {
    if points.len() < 3 || !(epsilon > 0.0) {
        return points.to_vec();
    }

    let start = points[0];
    let mut split = 0;
    let mut farthest = 0i64;
    for (i, p) in points.iter().enumerate().skip(1) {
        let dx = (p.x - start.x) as i64;
        let dy = (p.y - start.y) as i64;
        let d = dx * dx + dy * dy;
        if d > farthest {
            farthest = d;
            split = i;
        }
    }
    if split == 0 {
        return points.to_vec();
    }

    let curve: Vec<Point<i32>> = points.iter().map(|p| Point::new(p.x, p.y)).collect();
    let mut closing = curve[split..].to_vec();
    closing.push(curve[0]);

    let mut result = approximate_polygon_dp(&curve[..=split], epsilon, false);
    let second = approximate_polygon_dp(&closing, epsilon, false);
    result.pop();
    result.extend_from_slice(&second[..second.len() - 1]);

    result.into_iter().map(|p| PixelPoint::new(p.x, p.y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every pixel along the border of an axis-aligned rectangle
    fn dense_rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Contour {
        let mut points = Vec::new();
        for x in x0..x1 {
            points.push(PixelPoint::new(x, y0));
        }
        for y in y0..y1 {
            points.push(PixelPoint::new(x1, y));
        }
        for x in (x0 + 1..=x1).rev() {
            points.push(PixelPoint::new(x, y1));
        }
        for y in (y0 + 1..=y1).rev() {
            points.push(PixelPoint::new(x0, y));
        }
        Contour::new(points).unwrap()
    }

    #[test]
    fn test_straight_runs_collapse_to_corners() {
        let contour = dense_rect(40, 30, 60, 70);
        let smoothed = smooth_contour(&contour, &NormalizeConfig::default());
        assert_eq!(smoothed.len(), 4);
        assert_eq!(smoothed.bounding_box(), contour.bounding_box());
        for corner in [(40, 30), (60, 30), (60, 70), (40, 70)] {
            assert!(smoothed.points().contains(&PixelPoint::new(corner.0, corner.1)));
        }
    }

    #[test]
    fn test_point_count_never_grows() {
        let contour = Contour::new(vec![
            PixelPoint::new(0, 0),
            PixelPoint::new(10, 1),
            PixelPoint::new(20, 0),
            PixelPoint::new(21, 10),
            PixelPoint::new(20, 20),
            PixelPoint::new(0, 20),
        ])
        .unwrap();
        let smoothed = smooth_contour(&contour, &NormalizeConfig { epsilon_rate: 0.01 });
        assert!(smoothed.len() <= contour.len());
        assert!(smoothed.len() >= 3);
    }

    #[test]
    fn test_large_tolerance_keeps_valid_polygon() {
        let contour = dense_rect(0, 0, 10, 10);
        let smoothed = smooth_contour(&contour, &NormalizeConfig { epsilon_rate: 10.0 });
        assert!(smoothed.len() >= 3);
    }

    #[test]
    fn test_order_preserved() {
        let contour = dense_rect(0, 0, 30, 10);
        let smoothed = smooth_contour(&contour, &NormalizeConfig::default());
        let positions: Vec<usize> = smoothed
            .points()
            .iter()
            .map(|p| contour.points().iter().position(|q| q == p).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let contour = dense_rect(0, 0, 5, 5);
        assert_eq!(approximate_closed(contour.points(), 0.0), contour.points().to_vec());
    }
}
