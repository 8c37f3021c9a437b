// Pipeline configuration
// Tunable constants for each stage plus the on-disk calibration store

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TraceError};

/// Photograph to mask conversion.
#[derive(Debug, Clone, Copy)]
pub struct BinarizeConfig {
    /// Intensities strictly above this become white.
    pub threshold: u8,
    /// Multiplicative contrast gain applied between the two threshold passes.
    pub contrast_gain: f64,
    /// Additive brightness offset applied with the gain.
    pub brightness_offset: f64,
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            threshold: 128,
            contrast_gain: 1.5,
            brightness_offset: 10.0,
        }
    }
}

/// Contour simplification.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeConfig {
    /// Maximum deviation as a fraction of the contour perimeter.
    pub epsilon_rate: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            epsilon_rate: 0.0004,
        }
    }
}

/// Fiducial marker search.
#[derive(Debug, Clone, Copy)]
pub struct MarkerConfig {
    /// Dictionary id of the calibration marker.
    pub marker_id: u32,
    /// Printed side length of the marker in physical units.
    pub side_length: f64,
    /// Bits that may differ from the dictionary code.
    pub max_correction_bits: u32,

    // -- Candidate filtering --
    /// Smallest candidate perimeter, relative to the larger image side.
    pub min_perimeter_rate: f64,
    /// Largest candidate perimeter, relative to the larger image side.
    pub max_perimeter_rate: f64,
    /// Polygon approximation tolerance, relative to the candidate perimeter.
    pub polygon_accuracy_rate: f64,
    /// Shortest allowed side, relative to the candidate perimeter.
    pub min_side_rate: f64,

    // -- Bit sampling --
    /// Samples per cell along each axis.
    pub samples_per_cell: u32,
    /// Border cells that may read white before a candidate is rejected.
    pub max_border_errors: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            marker_id: 7,
            side_length: 40.0,
            max_correction_bits: 0,
            min_perimeter_rate: 0.03,
            max_perimeter_rate: 4.0,
            polygon_accuracy_rate: 0.03,
            min_side_rate: 0.05,
            samples_per_cell: 3,
            max_border_errors: 7,
        }
    }
}

/// Grid plate geometry. Lengths are physical units unless noted.
#[derive(Debug, Clone, Copy)]
pub struct PlateConfig {
    /// Size of one grid module.
    pub grid_unit: f64,
    /// Output units per physical unit, applied as a shape transform.
    pub output_unit_scale: f64,
    pub perimeter_corner_radius: f64,
    /// Stroke width in output units.
    pub stroke_width: f64,
    pub center_marker_radius: f64,
    pub cutout_height: f64,
    pub cutout_corner_radius: f64,
    /// Distance from the cutout to the plate edges.
    pub cutout_margin: f64,
    /// Extra document size in output units.
    pub document_padding: f64,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            grid_unit: 42.0,
            output_unit_scale: 3.8,
            perimeter_corner_radius: 3.8,
            stroke_width: 1.0,
            center_marker_radius: 1.0,
            cutout_height: 55.0,
            cutout_corner_radius: 7.0,
            cutout_margin: 5.0,
            document_padding: 10.0,
        }
    }
}

const FACTOR_KEY: &str = "scaling_factor";

#[derive(Debug, Serialize, Deserialize)]
struct StoredCalibration {
    scaling_factor: f64,
}

/// Single-key YAML file holding the manual calibration factor.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the stored factor.
    ///
    /// A missing file, missing key, unparsable document or non-positive value
    /// all report "factor not found".
    pub fn load(&self) -> Result<f64> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Calibration store {} does not exist", self.path.display());
                return Err(TraceError::calibration("factor not found"));
            }
            Err(e) => return Err(e.into()),
        };

        let document: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                debug!("Calibration store {} is not valid YAML: {}", self.path.display(), e);
                return Err(TraceError::calibration("factor not found"));
            }
        };

        let factor = document.get(FACTOR_KEY).and_then(|value| match value {
            serde_yaml::Value::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        });

        match factor {
            Some(f) if f.is_finite() && f > 0.0 => {
                info!("Loaded scaling factor {} from {}", f, self.path.display());
                Ok(f)
            }
            _ => Err(TraceError::calibration("factor not found")),
        }
    }

    /// Overwrite the store with a single factor.
    pub fn save(&self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(TraceError::calibration(format!(
                "refusing to store non-positive factor {}",
                factor
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(&StoredCalibration {
            scaling_factor: factor,
        })?;
        fs::write(&self.path, text)?;
        info!("Saved scaling factor {} to {}", factor, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("config.yaml"));
        store.save(0.2611).unwrap();
        assert_eq!(store.load().unwrap(), 0.2611);
    }

    #[test]
    fn test_missing_key_is_factor_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "other_key: 3.0\n").unwrap();
        let err = CalibrationStore::new(&path).load().unwrap_err();
        match err {
            TraceError::Calibration(msg) => assert_eq!(msg, "factor not found"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_factor_not_found() {
        let dir = tempdir().unwrap();
        let err = CalibrationStore::new(dir.path().join("nope.yaml"))
            .load()
            .unwrap_err();
        assert!(matches!(err, TraceError::Calibration(ref m) if m == "factor not found"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        for body in ["scaling_factor: -1.5\n", "scaling_factor: abc\n", "scaling_factor: 0\n"] {
            fs::write(&path, body).unwrap();
            assert!(CalibrationStore::new(&path).load().is_err(), "{body}");
        }
    }

    #[test]
    fn test_string_value_is_parsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "scaling_factor: '0.5'\n").unwrap();
        assert_eq!(CalibrationStore::new(&path).load().unwrap(), 0.5);
    }

    #[test]
    fn test_save_rejects_zero() {
        let dir = tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("config.yaml"));
        assert!(store.save(0.0).is_err());
    }
}
