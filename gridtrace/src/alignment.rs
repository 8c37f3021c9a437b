// Orientation alignment module
// Rotates a contour about its centroid so its long axis stands vertical

use gridtrace_common::{Contour, PixelPoint, Point2D};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use tracing::debug;

use crate::error::{Result, TraceError};

/// Minimum-area rotated bounding rectangle.
///
/// `angle` is in degrees within [0, 90) and gives the direction of the
/// `width` edge, measured from the x axis towards y (clockwise on screen).
/// `height` runs along the perpendicular direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point2D,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

/// Rotating calipers over the convex hull
pub fn min_area_rect(contour: &Contour) -> RotatedRect {
    let hull_points: Vec<Point<i32>> = contour.points().iter().map(|p| Point::new(p.x, p.y)).collect();
    let hull: Vec<Point2D> = convex_hull(hull_points)
        .into_iter()
        .map(|p| Point2D::new(p.x as f64, p.y as f64))
        .collect();

    let mut best: Option<(f64, RotatedRect)> = None;
    let n = hull.len();
    for i in 0..n {
        let a = hull[i];
        let b = hull[(i + 1) % n];
        let len = a.distance(&b);
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = ((b.x - a.x) / len, (b.y - a.y) / len);
        let (nx, ny) = (-uy, ux);

        let (mut min_u, mut max_u) = (f64::MAX, f64::MIN);
        let (mut min_n, mut max_n) = (f64::MAX, f64::MIN);
        for p in &hull {
            let pu = p.x * ux + p.y * uy;
            let pn = p.x * nx + p.y * ny;
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_n = min_n.min(pn);
            max_n = max_n.max(pn);
        }

        let area = (max_u - min_u) * (max_n - min_n);
        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let mid_u = (min_u + max_u) / 2.0;
            let mid_n = (min_n + max_n) / 2.0;
            let rect = RotatedRect {
                center: Point2D::new(mid_u * ux + mid_n * nx, mid_u * uy + mid_n * ny),
                width: max_u - min_u,
                height: max_n - min_n,
                angle: uy.atan2(ux).to_degrees(),
            };
            best = Some((area, rect));
        }
    }

    match best {
        Some((_, rect)) => normalize_angle(rect),
        None => {
            // a single distinct point
            let p = contour.points()[0].to_f64();
            RotatedRect {
                center: p,
                width: 0.0,
                height: 0.0,
                angle: 0.0,
            }
        }
    }
}

const ANGLE_EPS: f64 = 1e-9;

fn normalize_angle(rect: RotatedRect) -> RotatedRect {
    let mut angle = rect.angle.rem_euclid(180.0);
    let (mut width, mut height) = (rect.width, rect.height);
    while angle >= 90.0 - ANGLE_EPS {
        angle -= 90.0;
        std::mem::swap(&mut width, &mut height);
    }
    if angle < ANGLE_EPS {
        angle = 0.0;
    }
    RotatedRect {
        center: rect.center,
        width,
        height,
        angle,
    }
}

/// Rotation in degrees that brings the rectangle's long side vertical
pub fn correction_angle(rect: &RotatedRect) -> f64 {
    if rect.width < rect.height {
        -rect.angle
    } else {
        90.0 - rect.angle
    }
}

/// Rotate every point about the contour's centroid.
///
/// Each offset goes through polar form, gets `angle_deg` added modulo 360,
/// and is rounded back to the nearest pixel.
pub fn rotate_contour(contour: &Contour, angle_deg: f64) -> Result<Contour> {
    let c = contour
        .centroid()
        .ok_or_else(|| TraceError::detection("contour encloses no area, cannot rotate"))?;

    Ok(contour.map_points(|p| {
        let dx = p.x as f64 - c.x;
        let dy = p.y as f64 - c.y;
        let theta = dy.atan2(dx).to_degrees();
        let radius = dx.hypot(dy);
        let rotated = (theta + angle_deg).rem_euclid(360.0).to_radians();
        PixelPoint::new(
            (c.x + radius * rotated.cos()).round() as i32,
            (c.y + radius * rotated.sin()).round() as i32,
        )
    }))
}

/// Align the contour's long axis with the vertical axis
pub fn force_perpendicular(contour: &Contour) -> Result<Contour> {
    let rect = min_area_rect(contour);
    let angle = correction_angle(&rect);
    debug!(
        "Rotated rect {:.1}x{:.1} at {:.2} deg, correcting by {:.2} deg",
        rect.width, rect.height, rect.angle, angle
    );
    rotate_contour(contour, angle)
}
