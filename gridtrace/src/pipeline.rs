// Pipeline module
// Wires the stages together for the calibrate, convert and aruco commands

use std::path::{Path, PathBuf};

use gridtrace_common::{BoundingBox, CalibrationFactor, MarkerDictionary};
use tracing::{info, warn};

use crate::alignment::force_perpendicular;
use crate::calibration::{
    factor_from_marker, manual_scale_factor, reference_square_document, reference_square_side,
    MeasurementProvider,
};
use crate::config::{BinarizeConfig, CalibrationStore, MarkerConfig, NormalizeConfig, PlateConfig};
use crate::detection::{locate_marker, save_marker_debug, scan_markers, FiducialMeasurement, MarkerOutcome};
use crate::error::{Result, TraceError};
use crate::export_svg::write_svg;
use crate::layout::{layout_plate, to_document, PlateLayout};
use crate::segmentation::{binarize, extract_contours, load_grayscale, save_contour_debug, select_tool_contour};
use crate::smoothing::smooth_contour;

/// Added to the reference square document size
const REFERENCE_PADDING: f64 = 10.0;

/// Where one conversion gets its calibration from
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationSource {
    /// Factor given on the command line
    Explicit(f64),
    /// Measure the fiducial marker in the photograph
    Marker,
    /// Factor saved by an earlier `calibrate` run
    Store(PathBuf),
}

impl CalibrationSource {
    /// An explicit positive factor wins, then marker detection, then the store
    pub fn select(explicit: f64, use_marker: bool, store_path: &Path) -> Self {
        if explicit > 0.0 {
            CalibrationSource::Explicit(explicit)
        } else if use_marker {
            CalibrationSource::Marker
        } else {
            CalibrationSource::Store(store_path.to_path_buf())
        }
    }
}

/// Settings for one `convert` run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub source: CalibrationSource,
    pub with_cutout: bool,
    pub debug: bool,
    pub binarize: BinarizeConfig,
    pub normalize: NormalizeConfig,
    pub marker: MarkerConfig,
    pub plate: PlateConfig,
}

impl ConvertOptions {
    pub fn new(input: impl Into<PathBuf>, source: CalibrationSource) -> Self {
        Self {
            input: input.into(),
            output_dir: PathBuf::from("images/svg"),
            source,
            with_cutout: true,
            debug: false,
            binarize: BinarizeConfig::default(),
            normalize: NormalizeConfig::default(),
            marker: MarkerConfig::default(),
            plate: PlateConfig::default(),
        }
    }
}

/// What a successful conversion produced
#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub svg_path: PathBuf,
    pub factor: CalibrationFactor,
    pub layout: PlateLayout,
}

/// Photo to grid plate SVG
///
/// The SVG is only written once every stage has succeeded.
pub fn convert(opts: &ConvertOptions) -> Result<ConvertReport> {
    info!("Converting {}", opts.input.display());
    let gray = load_grayscale(&opts.input)?;
    let mask = binarize(&gray, &opts.binarize);
    let contours = extract_contours(&mask)?;
    info!("Found {} contour(s)", contours.len());

    let (factor, marker_region) = resolve_calibration(&opts.source, &mask, &opts.marker)?;
    info!("Calibration: {}", factor);

    let tool = select_tool_contour(&contours, marker_region.as_ref())?;
    let smoothed = smooth_contour(tool, &opts.normalize);
    let aligned = force_perpendicular(&smoothed)?;
    let layout = layout_plate(&aligned, &factor, &opts.plate, opts.with_cutout)?;
    let doc = to_document(&layout, &opts.plate);

    let stem = file_stem(&opts.input);
    if opts.debug {
        std::fs::create_dir_all(&opts.output_dir)?;
        mask.save(opts.output_dir.join(format!("{}_mask.png", stem)))?;
        save_contour_debug(&mask, &contours, tool, &opts.output_dir.join(format!("{}_contours.png", stem)))?;
        if opts.source == CalibrationSource::Marker {
            let scan = scan_markers(&mask, &MarkerDictionary::default(), &opts.marker);
            save_marker_debug(&mask, &scan, &opts.output_dir.join(format!("{}_markers.png", stem)))?;
        }
    }

    let svg_path = opts.output_dir.join(format!("{}.svg", stem));
    write_svg(&doc, &svg_path)?;

    Ok(ConvertReport {
        svg_path,
        factor,
        layout,
    })
}

fn resolve_calibration(
    source: &CalibrationSource,
    mask: &image::GrayImage,
    marker: &MarkerConfig,
) -> Result<(CalibrationFactor, Option<BoundingBox>)> {
    match source {
        CalibrationSource::Explicit(value) => {
            info!("Using scaling factor {} from the command line", value);
            let factor = CalibrationFactor::new(*value)
                .ok_or_else(|| TraceError::calibration(format!("invalid scaling factor {}", value)))?;
            Ok((factor, None))
        }
        CalibrationSource::Store(path) => {
            let value = CalibrationStore::new(path).load()?;
            let factor = CalibrationFactor::new(value)
                .ok_or_else(|| TraceError::calibration("factor not found"))?;
            Ok((factor, None))
        }
        CalibrationSource::Marker => {
            let measurement = locate_marker(mask, &MarkerDictionary::default(), marker)?.into_measurement()?;
            let factor = factor_from_marker(&measurement, marker.side_length)?;
            Ok((factor, Some(measurement.bounding_box())))
        }
    }
}

/// Settings for one `calibrate` run
#[derive(Debug, Clone)]
pub struct CalibrateOptions {
    pub input: PathBuf,
    pub known_width: f64,
    pub store_path: PathBuf,
    pub output_dir: PathBuf,
    pub binarize: BinarizeConfig,
    pub normalize: NormalizeConfig,
}

impl CalibrateOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            known_width: 10.0,
            store_path: PathBuf::from("config.yaml"),
            output_dir: PathBuf::from("images/svg"),
            binarize: BinarizeConfig::default(),
            normalize: NormalizeConfig::default(),
        }
    }
}

/// Manual calibration from a photo of a square of known width
///
/// Writes an unscaled reference SVG for the operator to measure, asks the
/// provider for that measurement, stores the factor and writes the scaled
/// reference.
pub fn calibrate(opts: &CalibrateOptions, provider: &mut dyn MeasurementProvider) -> Result<f64> {
    let gray = load_grayscale(&opts.input)?;
    let mask = binarize(&gray, &opts.binarize);
    let contours = extract_contours(&mask)?;
    let side = reference_square_side(&contours, &opts.normalize)?;

    let stem = file_stem(&opts.input);
    let unscaled_path = opts.output_dir.join(format!("{}-unscaled.svg", stem));
    write_svg(&reference_square_document(side, 1.0, REFERENCE_PADDING), &unscaled_path)?;

    let prompt = format!(
        "Import {} into a new CAD sketch and enter the measured width of the square",
        unscaled_path.display()
    );
    let measured = provider.measure(&prompt)?;
    let factor = manual_scale_factor(opts.known_width, measured)?;

    CalibrationStore::new(&opts.store_path).save(factor)?;

    let scaled_path = opts.output_dir.join(format!("{}-scaled.svg", stem));
    write_svg(&reference_square_document(side, factor, REFERENCE_PADDING), &scaled_path)?;
    info!("Import {} to check the scaled reference", scaled_path.display());

    Ok(factor)
}

/// Standalone marker check; a rejected-only scan is a warning, not a failure
pub fn aruco(
    input: &Path,
    binarize_config: &BinarizeConfig,
    marker: &MarkerConfig,
) -> Result<Option<FiducialMeasurement>> {
    let gray = load_grayscale(input)?;
    let mask = binarize(&gray, binarize_config);
    match locate_marker(&mask, &MarkerDictionary::default(), marker)? {
        MarkerOutcome::Found(measurement) => {
            let factor = factor_from_marker(&measurement, marker.side_length)?;
            info!(
                "Marker perimeter {:.1}px, {:.4} px per unit",
                measurement.perimeter,
                factor.pixels_per_unit()
            );
            Ok(Some(measurement))
        }
        MarkerOutcome::Rejected { candidates } => {
            warn!("No confident marker match among {} candidate(s)", candidates);
            Ok(None)
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::FixedMeasurement;
    use crate::detection::tests::draw_marker;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use tempfile::tempdir;

    fn save_photo(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn tool_photo() -> GrayImage {
        let mut img = GrayImage::from_pixel(400, 300, Luma([240u8]));
        draw_filled_rect_mut(&mut img, Rect::at(150, 60).of_size(60, 180), Luma([20u8]));
        img
    }

    #[test]
    fn test_source_precedence() {
        let store = Path::new("config.yaml");
        assert_eq!(CalibrationSource::select(0.5, true, store), CalibrationSource::Explicit(0.5));
        assert_eq!(CalibrationSource::select(0.0, true, store), CalibrationSource::Marker);
        assert_eq!(
            CalibrationSource::select(0.0, false, store),
            CalibrationSource::Store(store.to_path_buf())
        );
    }

    #[test]
    fn test_convert_with_explicit_factor() {
        let dir = tempdir().unwrap();
        let input = save_photo(dir.path(), "wrench.png", &tool_photo());
        let mut opts = ConvertOptions::new(&input, CalibrationSource::Explicit(0.5));
        opts.output_dir = dir.path().join("svg");

        let report = convert(&opts).unwrap();
        assert_eq!(report.svg_path, dir.path().join("svg/wrench.svg"));
        // ~62 x 182 px at 0.5 -> 1 x 3 units
        assert_eq!(report.layout.width_units, 1);
        assert_eq!(report.layout.height_units, 3);
        let svg = std::fs::read_to_string(&report.svg_path).unwrap();
        assert_eq!(svg.matches("<rect").count(), 2);
        assert_eq!(svg.matches("<circle").count(), 1);
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn test_convert_with_stored_factor_and_no_cutout() {
        let dir = tempdir().unwrap();
        let input = save_photo(dir.path(), "pliers.png", &tool_photo());
        let store = dir.path().join("config.yaml");
        CalibrationStore::new(&store).save(0.25).unwrap();

        let mut opts = ConvertOptions::new(&input, CalibrationSource::Store(store));
        opts.output_dir = dir.path().to_path_buf();
        opts.with_cutout = false;

        let report = convert(&opts).unwrap();
        assert_eq!(report.factor.units_per_pixel(), 0.25);
        let svg = std::fs::read_to_string(&report.svg_path).unwrap();
        assert_eq!(svg.matches("<rect").count(), 0);
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn test_convert_without_store_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = save_photo(dir.path(), "saw.png", &tool_photo());
        let mut opts = ConvertOptions::new(&input, CalibrationSource::Store(dir.path().join("missing.yaml")));
        opts.output_dir = dir.path().join("out");

        let err = convert(&opts).unwrap_err();
        assert!(matches!(err, TraceError::Calibration(ref m) if m == "factor not found"));
        assert!(!dir.path().join("out/saw.svg").exists());
    }

    #[test]
    fn test_convert_with_marker() {
        let dir = tempdir().unwrap();
        let mut img = GrayImage::from_pixel(500, 300, Luma([255u8]));
        draw_marker(&mut img, 7, 30, 30, 10, 0);
        draw_filled_rect_mut(&mut img, Rect::at(250, 40).of_size(70, 220), Luma([0u8]));
        let input = save_photo(dir.path(), "chisel.png", &img);

        let mut opts = ConvertOptions::new(&input, CalibrationSource::Marker);
        opts.output_dir = dir.path().to_path_buf();
        opts.debug = true;

        let report = convert(&opts).unwrap();
        // 240px perimeter on a 40mm marker
        assert!((report.factor.pixels_per_unit() - 1.5).abs() < 1e-9);
        assert!(dir.path().join("chisel_contours.png").exists());
        assert!(dir.path().join("chisel_markers.png").exists());
        // tool box is ~72 x 222 px, not the 60px marker
        assert_eq!(report.layout.height_units, 4);
    }

    #[test]
    fn test_convert_fails_without_marker() {
        let dir = tempdir().unwrap();
        let input = save_photo(dir.path(), "hammer.png", &tool_photo());
        let mut opts = ConvertOptions::new(&input, CalibrationSource::Marker);
        opts.output_dir = dir.path().to_path_buf();

        let err = convert(&opts).unwrap_err();
        assert!(matches!(err, TraceError::Detection(ref m) if m == "no calibration object detected"));
        assert!(!dir.path().join("hammer.svg").exists());
    }

    #[test]
    fn test_calibrate_stores_factor() {
        let dir = tempdir().unwrap();
        let mut img = GrayImage::from_pixel(300, 300, Luma([255u8]));
        draw_filled_rect_mut(&mut img, Rect::at(80, 80).of_size(149, 149), Luma([0u8]));
        let input = save_photo(dir.path(), "square.png", &img);

        let mut opts = CalibrateOptions::new(&input);
        opts.store_path = dir.path().join("config.yaml");
        opts.output_dir = dir.path().join("svg");

        let factor = calibrate(&opts, &mut FixedMeasurement(38.3)).unwrap();
        assert_eq!(factor, 10.0 / 38.3);
        assert_eq!(CalibrationStore::new(&opts.store_path).load().unwrap(), factor);
        assert!(dir.path().join("svg/square-unscaled.svg").exists());
        assert!(dir.path().join("svg/square-scaled.svg").exists());
    }

    #[test]
    fn test_calibrate_rejects_zero_measurement() {
        let dir = tempdir().unwrap();
        let mut img = GrayImage::from_pixel(200, 200, Luma([255u8]));
        draw_filled_rect_mut(&mut img, Rect::at(50, 50).of_size(60, 60), Luma([0u8]));
        let input = save_photo(dir.path(), "square.png", &img);

        let mut opts = CalibrateOptions::new(&input);
        opts.store_path = dir.path().join("config.yaml");
        opts.output_dir = dir.path().to_path_buf();

        let err = calibrate(&opts, &mut FixedMeasurement(0.0)).unwrap_err();
        assert!(matches!(err, TraceError::Calibration(_)));
        assert!(!opts.store_path.exists());
    }

    #[test]
    fn test_aruco_reports_marker() {
        let dir = tempdir().unwrap();
        let mut img = GrayImage::from_pixel(200, 200, Luma([255u8]));
        draw_marker(&mut img, 7, 40, 40, 10, 2);
        let input = save_photo(dir.path(), "marker.png", &img);

        let found = aruco(&input, &BinarizeConfig::default(), &MarkerConfig::default())
            .unwrap()
            .unwrap();
        assert!((found.perimeter - 240.0).abs() < 1e-6);
    }
}
