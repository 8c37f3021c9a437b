// Image segmentation module
// Binarizes the photograph and extracts area-ranked contours from the mask

use std::path::Path;

use gridtrace_common::{BoundingBox, Contour, PixelPoint};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::drawing::draw_hollow_polygon_mut;
use imageproc::map::map_colors;
use imageproc::point::Point;
use tracing::{debug, info};

use crate::config::BinarizeConfig;
use crate::error::{Result, TraceError};

/// Tool candidates may share at most this fraction of their box with the marker
const MARKER_OVERLAP_LIMIT: f64 = 0.10;

/// Load an image file as 8-bit grayscale
pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    if !path.is_file() {
        return Err(TraceError::Input(format!("{} does not exist", path.display())));
    }
    let img = image::open(path)
        .map_err(|e| TraceError::Input(format!("cannot decode {}: {}", path.display(), e)))?;
    let gray = img.to_luma8();
    debug!("Loaded {} ({}x{})", path.display(), gray.width(), gray.height());
    Ok(gray)
}

/// Convert a grayscale photograph into a pure black and white mask
///
/// Threshold, contrast rescale, then threshold again to clear anything the
/// rescale pushed back across the boundary.
pub fn binarize(gray: &GrayImage, config: &BinarizeConfig) -> GrayImage {
    let first = threshold(gray, config.threshold, ThresholdType::Binary);
    let rescaled = map_colors(&first, |p: Luma<u8>| {
        Luma([rescale(p[0], config.contrast_gain, config.brightness_offset)])
    });
    threshold(&rescaled, config.threshold, ThresholdType::Binary)
}

fn rescale(value: u8, gain: f64, offset: f64) -> u8 {
    (value as f64 * gain + offset).abs().round().clamp(0.0, 255.0) as u8
}

/// Find every border in the mask, largest enclosed area first
///
/// White pixels are foreground. The mask is framed with one black pixel so
/// regions touching the image edge still get an outer border; index 0 is
/// therefore the whole-frame boundary for a photo on white paper.
pub fn extract_contours(mask: &GrayImage) -> Result<Vec<Contour>> {
    let padded = pad_mask(mask);
    let traced = find_contours::<i32>(&padded);

    let mut contours: Vec<Contour> = traced
        .iter()
        .filter_map(|c| {
            let points = c
                .points
                .iter()
                .map(|p| PixelPoint::new(p.x - 1, p.y - 1))
                .collect();
            Contour::new(compress_straight_runs(points))
        })
        .collect();

    contours.sort_by(|a, b| b.area().total_cmp(&a.area()));
    debug!("Traced {} borders, kept {} contours", traced.len(), contours.len());

    if contours.len() < 2 {
        return Err(TraceError::detection("no shapes detected"));
    }
    Ok(contours)
}

/// Pick the tool outline from area-ranked contours
///
/// Skips the frame at index 0 and any contour that mostly sits on the
/// calibration marker.
pub fn select_tool_contour<'a>(
    contours: &'a [Contour],
    marker_region: Option<&BoundingBox>,
) -> Result<&'a Contour> {
    for (idx, contour) in contours.iter().enumerate().skip(1) {
        let bbox = contour.bounding_box();
        if let Some(region) = marker_region {
            let overlap = bbox.intersection_area(region) as f64 / bbox.area().max(1) as f64;
            if overlap > MARKER_OVERLAP_LIMIT {
                debug!("Contour {} overlaps the marker ({:.0}%), skipping", idx, overlap * 100.0);
                continue;
            }
        }
        info!(
            "Selected contour {}: {} points, area {:.0}px, box {}x{}",
            idx,
            contour.len(),
            contour.area(),
            bbox.width,
            bbox.height
        );
        return Ok(contour);
    }
    Err(TraceError::detection("no shapes detected"))
}

pub(crate) fn pad_mask(mask: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for (x, y, p) in mask.enumerate_pixels() {
        padded.put_pixel(x + 1, y + 1, *p);
    }
    padded
}

/// Keep only the points where the border changes direction
pub(crate) fn compress_straight_runs(points: Vec<PixelPoint>) -> Vec<PixelPoint> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let step = |a: PixelPoint, b: PixelPoint| ((b.x - a.x).signum(), (b.y - a.y).signum());
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect()
}

/// Save the mask with the selected contour in green and the rest in gray
pub fn save_contour_debug(
    mask: &GrayImage,
    contours: &[Contour],
    selected: &Contour,
    path: &Path,
) -> Result<()> {
    let mut debug_img = RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y)[0] / 2 + 64;
        Rgb([v, v, v])
    });

    for contour in contours {
        let color = if contour == selected {
            Rgb([0u8, 200u8, 0u8])
        } else {
            Rgb([200u8, 60u8, 60u8])
        };
        draw_hollow_polygon_mut(&mut debug_img, &as_float_polygon(contour), color);
    }

    debug_img.save(path)?;
    info!("Saved contour debug image to: {}", path.display());
    Ok(())
}

fn as_float_polygon(contour: &Contour) -> Vec<Point<f32>> {
    let mut poly: Vec<Point<f32>> = contour
        .points()
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect();
    // the drawing routine closes the polygon itself and rejects a repeated end point
    while poly.len() > 2 && poly.first() == poly.last() {
        poly.pop();
    }
    poly
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn white_with_black_rect(w: u32, h: u32, rect: Rect) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([255u8]));
        draw_filled_rect_mut(&mut img, rect, Luma([0u8]));
        img
    }

    #[test]
    fn test_binarize_outputs_two_tones() {
        let gray = GrayImage::from_fn(64, 4, |x, _| Luma([(x * 4) as u8]));
        let mask = binarize(&gray, &BinarizeConfig::default());
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(mask.get_pixel(32, 0)[0], 0); // 128 stays black
        assert_eq!(mask.get_pixel(33, 0)[0], 255);
    }

    #[test]
    fn test_rescale_saturates() {
        assert_eq!(rescale(0, 1.5, 10.0), 10);
        assert_eq!(rescale(255, 1.5, 10.0), 255);
        assert_eq!(rescale(100, 1.5, 10.0), 160);
    }

    #[test]
    fn test_single_shape_ordering() {
        let mask = white_with_black_rect(100, 80, Rect::at(30, 20).of_size(40, 30));
        let contours = extract_contours(&mask).unwrap();
        assert!(contours.len() >= 2);
        assert!(contours[0].area() >= contours[1].area());
        for pair in contours.windows(2) {
            assert!(pair[0].area() >= pair[1].area());
        }
    }

    #[test]
    fn test_frame_is_first_contour() {
        let mask = white_with_black_rect(100, 80, Rect::at(30, 20).of_size(40, 30));
        let contours = extract_contours(&mask).unwrap();
        let frame = contours[0].bounding_box();
        assert_eq!(frame, BoundingBox { x: 0, y: 0, width: 100, height: 80 });
        // simplified encoding leaves only the four frame corners
        assert_eq!(contours[0].len(), 4);
    }

    #[test]
    fn test_shape_contour_surrounds_rectangle() {
        let mask = white_with_black_rect(100, 80, Rect::at(30, 20).of_size(40, 30));
        let contours = extract_contours(&mask).unwrap();
        let tool = select_tool_contour(&contours, None).unwrap();
        let bbox = tool.bounding_box();
        assert!((bbox.center().x - 50.0).abs() <= 1.0);
        assert!((bbox.center().y - 35.0).abs() <= 1.0);
        assert!(bbox.width >= 40 && bbox.width <= 42);
    }

    #[test]
    fn test_background_only_mask_fails() {
        for value in [0u8, 255u8] {
            let mask = GrayImage::from_pixel(50, 50, Luma([value]));
            match extract_contours(&mask) {
                Err(TraceError::Detection(msg)) => assert_eq!(msg, "no shapes detected"),
                other => panic!("unexpected result: {:?}", other.map(|c| c.len())),
            }
        }
    }

    #[test]
    fn test_marker_region_is_skipped() {
        let mut mask = white_with_black_rect(200, 100, Rect::at(10, 10).of_size(60, 60));
        draw_filled_rect_mut(&mut mask, Rect::at(120, 30).of_size(50, 20), Luma([0u8]));
        let contours = extract_contours(&mask).unwrap();
        let marker = BoundingBox { x: 10, y: 10, width: 60, height: 60 };
        let tool = select_tool_contour(&contours, Some(&marker)).unwrap();
        assert!(tool.bounding_box().x >= 110);
    }

    #[test]
    fn test_compress_keeps_corners() {
        let square: Vec<PixelPoint> = [(0, 0), (1, 0), (2, 0), (2, 1), (2, 2), (1, 2), (0, 2), (0, 1)]
            .iter()
            .map(|&(x, y)| PixelPoint::new(x, y))
            .collect();
        let compressed = compress_straight_runs(square);
        assert_eq!(
            compressed,
            vec![
                PixelPoint::new(0, 0),
                PixelPoint::new(2, 0),
                PixelPoint::new(2, 2),
                PixelPoint::new(0, 2)
            ]
        );
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = load_grayscale(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, TraceError::Input(_)));
    }

    #[test]
    fn test_undecodable_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_grayscale(&path).unwrap_err();
        assert!(matches!(err, TraceError::Input(ref m) if m.starts_with("cannot decode")));
    }
}
