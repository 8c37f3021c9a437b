// Plate layout module
// Quantizes the tool footprint onto the grid and composes the plate drawing

use gridtrace_common::{CalibrationFactor, Contour, Point2D, Shape, Style, VectorDocument};
use tracing::{debug, info, warn};

use crate::calibration::scale_contour;
use crate::config::PlateConfig;
use crate::error::Result;

/// Rectangle in physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Grid-quantized plate with the tool centered inside.
///
/// Plate geometry is in physical units; `tool` is already in output units.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateLayout {
    pub width_units: u32,
    pub height_units: u32,
    pub perimeter_width: f64,
    pub perimeter_height: f64,
    pub center_marker: Option<Point2D>,
    pub cutout: Option<PlateRect>,
    pub tool: Contour,
}

/// Whole grid units needed to hold a pixel length, never less than one
pub fn grid_units(length_px: f64, units_per_pixel: f64, grid_unit: f64) -> u32 {
    ((length_px * units_per_pixel / grid_unit).ceil() as u32).max(1)
}

/// Lay an oriented tool contour onto the smallest plate of whole grid units
pub fn layout_plate(
    tool: &Contour,
    factor: &CalibrationFactor,
    config: &PlateConfig,
    with_cutout: bool,
) -> Result<PlateLayout> {
    let bbox = tool.bounding_box();
    let scale = factor.units_per_pixel();

    let width_units = grid_units(bbox.width as f64, scale, config.grid_unit);
    let height_units = grid_units(bbox.height as f64, scale, config.grid_unit);
    let perimeter_width = width_units as f64 * config.grid_unit;
    let perimeter_height = height_units as f64 * config.grid_unit;
    info!("Tool is {} x {} grid units", width_units, height_units);
    debug!(
        "Perimeter {} x {}, tool {} x {}px",
        perimeter_width, perimeter_height, bbox.width, bbox.height
    );

    let scaled = scale_contour(tool, scale * config.output_unit_scale)?;
    let scaled_center = scaled.bounding_box().center();
    let target = Point2D::new(
        perimeter_width * config.output_unit_scale / 2.0,
        perimeter_height * config.output_unit_scale / 2.0,
    );
    let dx = (target.x - scaled_center.x).round() as i32;
    let dy = (target.y - scaled_center.y).round() as i32;
    let centered = scaled.translate(dx, dy);
    debug!("Centered tool with offset ({}, {})", dx, dy);

    let (center_marker, cutout) = if with_cutout {
        let center = Point2D::new(perimeter_width / 2.0, perimeter_height / 2.0);
        (Some(center), cutout_rect(perimeter_width, perimeter_height, config))
    } else {
        (None, None)
    };

    Ok(PlateLayout {
        width_units,
        height_units,
        perimeter_width,
        perimeter_height,
        center_marker,
        cutout,
        tool: centered,
    })
}

/// Finger cutout along the bottom edge, shrunk when the plate is too short
fn cutout_rect(plate_width: f64, plate_height: f64, config: &PlateConfig) -> Option<PlateRect> {
    let margin = config.cutout_margin;
    let width = plate_width - 2.0 * margin;
    let height = config.cutout_height.min(plate_height - 2.0 * margin);
    if width <= 0.0 || height <= 0.0 {
        warn!("Plate {}x{} has no room for a cutout", plate_width, plate_height);
        return None;
    }
    if height < config.cutout_height {
        debug!("Cutout height clamped to {}", height);
    }
    Some(PlateRect {
        x: margin,
        y: plate_height - height - margin,
        width,
        height,
    })
}

/// Compose the drawing: perimeter, center marker, cutout, then the tool
pub fn to_document(layout: &PlateLayout, config: &PlateConfig) -> VectorDocument {
    let u = config.output_unit_scale;
    let mut doc = VectorDocument::new(
        layout.perimeter_width * u + config.document_padding,
        layout.perimeter_height * u + config.document_padding,
    );

    if let Some(cutout) = layout.cutout {
        doc.shapes.push(Shape::Rect {
            x: 0.0,
            y: 0.0,
            width: layout.perimeter_width,
            height: layout.perimeter_height,
            corner_radius: config.perimeter_corner_radius,
            style: Style::outline("red", config.stroke_width).with_fill("transparent"),
            scale: u,
        });
        if let Some(center) = layout.center_marker {
            doc.shapes.push(Shape::Circle {
                cx: center.x,
                cy: center.y,
                r: config.center_marker_radius,
                style: Style::outline("blue", config.stroke_width),
                scale: u,
            });
        }
        doc.shapes.push(Shape::Rect {
            x: cutout.x,
            y: cutout.y,
            width: cutout.width,
            height: cutout.height,
            corner_radius: config.cutout_corner_radius,
            style: Style::outline("green", config.stroke_width),
            scale: u,
        });
    }

    doc.shapes.push(Shape::closed_path(
        &layout.tool,
        Style::outline("blue", config.stroke_width),
    ));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtrace_common::PixelPoint;

    fn rect_contour(w: i32, h: i32) -> Contour {
        Contour::new(vec![
            PixelPoint::new(0, 0),
            PixelPoint::new(w - 1, 0),
            PixelPoint::new(w - 1, h - 1),
            PixelPoint::new(0, h - 1),
        ])
        .unwrap()
    }

    #[test]
    fn test_small_tool_fits_one_unit() {
        let factor = CalibrationFactor::new(10.0 / 38.3).unwrap();
        let layout = layout_plate(&rect_contour(149, 80), &factor, &PlateConfig::default(), true).unwrap();
        assert_eq!(layout.width_units, 1);
        assert_eq!(layout.height_units, 1);
        assert_eq!(layout.perimeter_width, 42.0);
        assert_eq!(layout.perimeter_height, 42.0);
    }

    #[test]
    fn test_quantization_is_ceiling() {
        let g = 42.0;
        for w in [1.0, 41.0, 42.0, 43.0, 149.0, 400.0, 1234.0] {
            for s in [0.05, 0.2611, 0.5, 1.0, 2.5] {
                let units = grid_units(w, s, g);
                assert_eq!(units as f64, (w * s / g).ceil().max(1.0));
                assert!(units as f64 * g >= w * s);
            }
        }
    }

    #[test]
    fn test_tool_is_centered() {
        let config = PlateConfig::default();
        let factor = CalibrationFactor::new(0.4).unwrap();
        for (w, h) in [(149, 80), (300, 500), (37, 211)] {
            let tool = rect_contour(w, h).translate(500, 200);
            let layout = layout_plate(&tool, &factor, &config, true).unwrap();
            let center = layout.tool.bounding_box().center();
            let plate_x = layout.perimeter_width * config.output_unit_scale / 2.0;
            let plate_y = layout.perimeter_height * config.output_unit_scale / 2.0;
            assert!((center.x - plate_x).abs() <= 1.0, "{w}x{h}: {center:?}");
            assert!((center.y - plate_y).abs() <= 1.0, "{w}x{h}: {center:?}");
        }
    }

    #[test]
    fn test_shape_order_with_cutout() {
        let config = PlateConfig::default();
        let factor = CalibrationFactor::new(0.4).unwrap();
        let layout = layout_plate(&rect_contour(300, 500), &factor, &config, true).unwrap();
        let doc = to_document(&layout, &config);
        assert_eq!(doc.shapes.len(), 4);
        assert!(matches!(doc.shapes[0], Shape::Rect { corner_radius, .. } if corner_radius == 3.8));
        assert!(matches!(doc.shapes[1], Shape::Circle { .. }));
        assert!(matches!(doc.shapes[2], Shape::Rect { corner_radius, .. } if corner_radius == 7.0));
        assert!(matches!(doc.shapes[3], Shape::Path { .. }));
        // 300 x 500 px at 0.4 -> 3 x 5 units
        assert_eq!(doc.width, 3.0 * 42.0 * 3.8 + 10.0);
        assert_eq!(doc.height, 5.0 * 42.0 * 3.8 + 10.0);
    }

    #[test]
    fn test_no_cutout_leaves_only_tool() {
        let config = PlateConfig::default();
        let factor = CalibrationFactor::new(0.4).unwrap();
        let layout = layout_plate(&rect_contour(300, 500), &factor, &config, false).unwrap();
        assert!(layout.cutout.is_none());
        let doc = to_document(&layout, &config);
        assert_eq!(doc.shapes.len(), 1);
        assert!(matches!(doc.shapes[0], Shape::Path { .. }));
    }

    #[test]
    fn test_cutout_sits_on_bottom_edge() {
        let config = PlateConfig::default();
        let cutout = cutout_rect(126.0, 210.0, &config).unwrap();
        assert_eq!(cutout, PlateRect { x: 5.0, y: 150.0, width: 116.0, height: 55.0 });
    }

    #[test]
    fn test_cutout_clamped_on_single_unit_plate() {
        let config = PlateConfig::default();
        let cutout = cutout_rect(42.0, 42.0, &config).unwrap();
        assert_eq!(cutout.height, 32.0);
        assert_eq!(cutout.y, 5.0);
    }
}
