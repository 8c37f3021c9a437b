// Fiducial marker detection module
// Finds square 4x4 dictionary markers in a binary mask and measures their perimeter

use std::path::Path;

use gridtrace_common::{BoundingBox, Contour, MarkerDictionary, PixelPoint, Point2D, MARKER_GRID_CELLS};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_hollow_polygon_mut;
use imageproc::geometric_transformations::Projection;
use imageproc::map::map_colors;
use imageproc::point::Point;
use tracing::{debug, info, warn};

use crate::config::MarkerConfig;
use crate::error::{Result, TraceError};
use crate::segmentation::{compress_straight_runs, pad_mask};
use crate::smoothing::approximate_closed;

/// A decoded marker with corners starting at its top-left cell, clockwise
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDetection {
    pub id: u32,
    pub corners: [Point2D; 4],
    /// Quarter turns clockwise the marker appears rotated in the image
    pub rotation: u8,
}

/// Everything found while scanning a mask
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerScan {
    pub detected: Vec<MarkerDetection>,
    /// Square candidates that failed to decode
    pub rejected: Vec<[Point2D; 4]>,
}

/// Corners of the calibration marker plus its perimeter in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct FiducialMeasurement {
    pub corners: [Point2D; 4],
    pub perimeter: f64,
}

impl FiducialMeasurement {
    pub fn from_corners(corners: [Point2D; 4]) -> Self {
        let perimeter = (0..4).map(|i| corners[i].distance(&corners[(i + 1) % 4])).sum();
        Self { corners, perimeter }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let min_x = self.corners.iter().map(|p| p.x).fold(f64::MAX, f64::min).floor() as i32;
        let min_y = self.corners.iter().map(|p| p.y).fold(f64::MAX, f64::min).floor() as i32;
        let max_x = self.corners.iter().map(|p| p.x).fold(f64::MIN, f64::max).ceil() as i32;
        let max_y = self.corners.iter().map(|p| p.y).fold(f64::MIN, f64::max).ceil() as i32;
        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }
}

/// Result of looking for the calibration marker
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOutcome {
    Found(FiducialMeasurement),
    /// Nothing matched but some square candidates were seen
    Rejected { candidates: usize },
}

impl MarkerOutcome {
    /// Treat a rejected-only scan as a missing marker
    pub fn into_measurement(self) -> Result<FiducialMeasurement> {
        match self {
            MarkerOutcome::Found(measurement) => Ok(measurement),
            MarkerOutcome::Rejected { .. } => {
                Err(TraceError::detection("no calibration object detected"))
            }
        }
    }
}

/// Look for exactly one marker carrying the configured id
pub fn locate_marker(
    mask: &GrayImage,
    dictionary: &MarkerDictionary,
    config: &MarkerConfig,
) -> Result<MarkerOutcome> {
    let scan = scan_markers(mask, dictionary, config);

    if let [only] = scan.detected.as_slice() {
        if only.id == config.marker_id {
            let measurement = FiducialMeasurement::from_corners(only.corners);
            info!(
                "Found marker {} with perimeter {:.1}px",
                only.id, measurement.perimeter
            );
            return Ok(MarkerOutcome::Found(measurement));
        }
    }

    let candidates = scan.rejected.len() + scan.detected.len();
    if candidates > 0 {
        for det in &scan.detected {
            debug!("Ignoring marker {} at ({:.1}, {:.1})", det.id, det.corners[0].x, det.corners[0].y);
        }
        warn!("Potential marker rejected ({} candidate(s))", candidates);
        return Ok(MarkerOutcome::Rejected { candidates });
    }

    Err(TraceError::detection("no calibration object detected"))
}

/// Find and decode every square dark candidate in the mask
pub fn scan_markers(mask: &GrayImage, dictionary: &MarkerDictionary, config: &MarkerConfig) -> MarkerScan {
    let inverted = map_colors(mask, |p: Luma<u8>| Luma([if p[0] == 0 { 255u8 } else { 0u8 }]));
    let padded = pad_mask(&inverted);

    let max_dim = mask.width().max(mask.height()) as f64;
    let min_perimeter = config.min_perimeter_rate * max_dim;
    let max_perimeter = config.max_perimeter_rate * max_dim;

    let mut scan = MarkerScan::default();
    for border in find_contours::<i32>(&padded) {
        if border.border_type != BorderType::Outer {
            continue;
        }
        let points: Vec<PixelPoint> = border
            .points
            .iter()
            .map(|p| PixelPoint::new(p.x - 1, p.y - 1))
            .collect();
        let Some(contour) = Contour::new(compress_straight_runs(points)) else {
            continue;
        };
        let perimeter = contour.perimeter();
        if perimeter < min_perimeter || perimeter > max_perimeter {
            continue;
        }
        let Some(quad) = quad_candidate(&contour, perimeter, config) else {
            continue;
        };

        match decode_candidate(mask, &quad, dictionary, config) {
            Some(detection) => {
                debug!("Decoded marker {} (rotation {})", detection.id, detection.rotation);
                scan.detected.push(detection);
            }
            None => scan.rejected.push(quad),
        }
    }

    // quads traced inside a decoded marker are its own data cells
    let detected = &scan.detected;
    scan.rejected.retain(|quad| {
        let center = quad_center(quad);
        !detected.iter().any(|d| point_in_quad(&center, &d.corners))
    });

    debug!(
        "Marker scan: {} detected, {} rejected",
        scan.detected.len(),
        scan.rejected.len()
    );
    scan
}

/// Reduce a border to a convex quadrilateral ordered clockwise on screen
fn quad_candidate(contour: &Contour, perimeter: f64, config: &MarkerConfig) -> Option<[Point2D; 4]> {
    let approx = approximate_closed(contour.points(), config.polygon_accuracy_rate * perimeter);
    if approx.len() != 4 {
        return None;
    }
    let mut quad = [
        approx[0].to_f64(),
        approx[1].to_f64(),
        approx[2].to_f64(),
        approx[3].to_f64(),
    ];

    let min_side = config.min_side_rate * perimeter;
    if (0..4).any(|i| quad[i].distance(&quad[(i + 1) % 4]) < min_side) {
        return None;
    }

    let turns: Vec<f64> = (0..4)
        .map(|i| cross(&quad[i], &quad[(i + 1) % 4], &quad[(i + 2) % 4]))
        .collect();
    let convex = turns.iter().all(|&t| t > 0.0) || turns.iter().all(|&t| t < 0.0);
    if !convex {
        return None;
    }
    if turns[0] < 0.0 {
        quad.swap(1, 3);
    }
    Some(to_pixel_edges(&quad))
}

/// Move every side half a pixel outward
///
/// Borders are traced through boundary pixel centers, so an N pixel wide
/// square would otherwise measure N - 1 per side.
fn to_pixel_edges(quad: &[Point2D; 4]) -> [Point2D; 4] {
    let center = quad_center(quad);
    let normals: Vec<(f64, f64)> = (0..4)
        .map(|i| {
            let (a, b) = (quad[i], quad[(i + 1) % 4]);
            let len = a.distance(&b);
            let (mut nx, mut ny) = ((b.y - a.y) / len, -(b.x - a.x) / len);
            let (mx, my) = ((a.x + b.x) / 2.0 - center.x, (a.y + b.y) / 2.0 - center.y);
            if nx * mx + ny * my < 0.0 {
                nx = -nx;
                ny = -ny;
            }
            (nx, ny)
        })
        .collect();

    let mut out = *quad;
    for (i, corner) in out.iter_mut().enumerate() {
        let (ax, ay) = normals[(i + 3) % 4];
        let (bx, by) = normals[i];
        let denom = 1.0 + ax * bx + ay * by;
        corner.x += 0.5 * (ax + bx) / denom;
        corner.y += 0.5 * (ay + by) / denom;
    }
    out
}

fn cross(a: &Point2D, b: &Point2D, c: &Point2D) -> f64 {
    (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
}

/// Sample the cell grid through a projection and match it to the dictionary
fn decode_candidate(
    mask: &GrayImage,
    quad: &[Point2D; 4],
    dictionary: &MarkerDictionary,
    config: &MarkerConfig,
) -> Option<MarkerDetection> {
    let side = MARKER_GRID_CELLS as f32;
    let projection = Projection::from_control_points(
        [(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)],
        [
            (quad[0].x as f32, quad[0].y as f32),
            (quad[1].x as f32, quad[1].y as f32),
            (quad[2].x as f32, quad[2].y as f32),
            (quad[3].x as f32, quad[3].y as f32),
        ],
    )?;

    let cells = sample_cells(mask, &projection, config.samples_per_cell.max(1));

    let last = MARKER_GRID_CELLS - 1;
    let border_errors = (0..MARKER_GRID_CELLS)
        .flat_map(|r| (0..MARKER_GRID_CELLS).map(move |c| (r, c)))
        .filter(|&(r, c)| r == 0 || c == 0 || r == last || c == last)
        .filter(|&(r, c)| !cells[r][c])
        .count();
    if border_errors > config.max_border_errors {
        return None;
    }

    let mut observed = 0u16;
    for r in 1..last {
        for c in 1..last {
            observed <<= 1;
            if !cells[r][c] {
                observed |= 1;
            }
        }
    }

    let matched = dictionary.identify(observed, config.max_correction_bits)?;
    let mut corners = *quad;
    corners.rotate_left(matched.rotation as usize);
    Some(MarkerDetection {
        id: matched.id,
        corners,
        rotation: matched.rotation,
    })
}

/// Majority vote per cell, `true` meaning black
fn sample_cells(
    mask: &GrayImage,
    projection: &Projection,
    samples: u32,
) -> [[bool; MARKER_GRID_CELLS]; MARKER_GRID_CELLS] {
    let mut cells = [[false; MARKER_GRID_CELLS]; MARKER_GRID_CELLS];
    let step = 1.0 / samples as f32;
    for (r, row) in cells.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            let mut black = 0;
            for j in 0..samples {
                for i in 0..samples {
                    let u = c as f32 + (i as f32 + 0.5) * step;
                    let v = r as f32 + (j as f32 + 0.5) * step;
                    let (x, y) = *projection * (u, v);
                    if is_black(mask, x, y) {
                        black += 1;
                    }
                }
            }
            *cell = black * 2 > samples * samples;
        }
    }
    cells
}

fn is_black(mask: &GrayImage, x: f32, y: f32) -> bool {
    let (x, y) = (x.round(), y.round());
    if x < 0.0 || y < 0.0 || x >= mask.width() as f32 || y >= mask.height() as f32 {
        return false;
    }
    mask.get_pixel(x as u32, y as u32)[0] == 0
}

fn quad_center(quad: &[Point2D; 4]) -> Point2D {
    Point2D::new(
        quad.iter().map(|p| p.x).sum::<f64>() / 4.0,
        quad.iter().map(|p| p.y).sum::<f64>() / 4.0,
    )
}

/// Inside test for a convex quad with clockwise corners
fn point_in_quad(p: &Point2D, quad: &[Point2D; 4]) -> bool {
    (0..4).all(|i| {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x) >= 0.0
    })
}

/// Save the mask with decoded markers in green and rejected candidates in red
pub fn save_marker_debug(mask: &GrayImage, scan: &MarkerScan, path: &Path) -> Result<()> {
    let mut debug_img = RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y)[0] / 2 + 64;
        Rgb([v, v, v])
    });

    let to_poly = |quad: &[Point2D; 4]| -> Vec<Point<f32>> {
        quad.iter().map(|p| Point::new(p.x as f32, p.y as f32)).collect()
    };
    for quad in &scan.rejected {
        draw_hollow_polygon_mut(&mut debug_img, &to_poly(quad), Rgb([220u8, 40u8, 40u8]));
    }
    for det in &scan.detected {
        draw_hollow_polygon_mut(&mut debug_img, &to_poly(&det.corners), Rgb([0u8, 220u8, 0u8]));
    }

    debug_img.save(path)?;
    info!("Saved marker debug image to: {}", path.display());
    Ok(())
}
