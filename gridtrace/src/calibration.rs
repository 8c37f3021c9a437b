// Scale calibration module
// Turns a marker measurement or an operator's CAD measurement into a units-per-pixel factor

use gridtrace_common::{CalibrationFactor, Contour, PixelPoint, Shape, Style, VectorDocument};
use tracing::{debug, info};

use crate::alignment::min_area_rect;
use crate::config::NormalizeConfig;
use crate::detection::FiducialMeasurement;
use crate::error::{Result, TraceError};
use crate::smoothing::smooth_contour;

/// Source of a physical length measured outside the program
///
/// The interactive binary reads it from the terminal; tests hand in a fixed value.
pub trait MeasurementProvider {
    fn measure(&mut self, prompt: &str) -> Result<f64>;
}

/// Always answers with the same measurement
#[derive(Debug, Clone, Copy)]
pub struct FixedMeasurement(pub f64);

impl MeasurementProvider for FixedMeasurement {
    fn measure(&mut self, prompt: &str) -> Result<f64> {
        debug!("{} -> {}", prompt, self.0);
        Ok(self.0)
    }
}

/// Automatic calibration from a marker of known side length
///
/// The marker's pixel perimeter P over four sides of length L gives P / 4L
/// pixels per unit.
pub fn factor_from_marker(measurement: &FiducialMeasurement, side_length: f64) -> Result<CalibrationFactor> {
    if !(side_length > 0.0) || !side_length.is_finite() {
        return Err(TraceError::calibration(format!(
            "marker side length must be positive, got {}",
            side_length
        )));
    }
    if !(measurement.perimeter > 0.0) {
        return Err(TraceError::calibration("marker perimeter is zero"));
    }

    let pixels_per_unit = measurement.perimeter / (4.0 * side_length);
    info!("Marker calibration: {:.4} px per unit", pixels_per_unit);
    CalibrationFactor::new(1.0 / pixels_per_unit)
        .ok_or_else(|| TraceError::calibration("marker calibration produced an invalid factor"))
}

/// Manual calibration: known physical width over the width measured in CAD
pub fn manual_scale_factor(known_width: f64, measured: f64) -> Result<f64> {
    if !(measured > 0.0) || !measured.is_finite() {
        return Err(TraceError::calibration(format!(
            "measurement must be a positive number, got {}",
            measured
        )));
    }
    if !(known_width > 0.0) || !known_width.is_finite() {
        return Err(TraceError::calibration(format!(
            "known width must be a positive number, got {}",
            known_width
        )));
    }

    let factor = known_width / measured;
    if factor > 1.0 {
        info!("Scaling factor {:.4}: the SVG needs to be scaled up", factor);
    } else if factor < 1.0 {
        info!("Scaling factor {:.4}: the SVG needs to be scaled down", factor);
    } else {
        info!("Scaling factor is 1, no scaling needed");
    }
    Ok(factor)
}

/// Scale every point about the contour's centroid
pub fn scale_contour(contour: &Contour, factor: f64) -> Result<Contour> {
    let c = contour
        .centroid()
        .ok_or_else(|| TraceError::detection("contour encloses no area, cannot scale"))?;
    debug!("Scaling contour by {:.4} about ({:.1}, {:.1})", factor, c.x, c.y);
    Ok(contour.map_points(|p| {
        PixelPoint::new(
            (c.x + (p.x as f64 - c.x) * factor).round() as i32,
            (c.y + (p.y as f64 - c.y) * factor).round() as i32,
        )
    }))
}

/// Side of the reference square: the longer side of the largest real shape
pub fn reference_square_side(contours: &[Contour], normalize: &NormalizeConfig) -> Result<f64> {
    let square = contours
        .get(1)
        .ok_or_else(|| TraceError::detection("no shapes detected"))?;
    let rect = min_area_rect(&smooth_contour(square, normalize));
    let side = rect.width.max(rect.height);
    info!("Reference square is {:.1}px wide", side);
    Ok(side)
}

/// Red square of side `side * scale` at the origin, with `padding` added to
/// the document size
pub fn reference_square_document(side: f64, scale: f64, padding: f64) -> VectorDocument {
    let dimension = side * scale;
    let mut doc = VectorDocument::new(dimension + padding, dimension + padding);
    doc.shapes.push(Shape::Rect {
        x: 0.0,
        y: 0.0,
        width: dimension,
        height: dimension,
        corner_radius: 0.0,
        style: Style::outline("red", 2.0).with_fill("transparent"),
        scale: 1.0,
    });
    doc
}
