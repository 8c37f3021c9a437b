use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridtrace::calibration::{FixedMeasurement, MeasurementProvider};
use gridtrace::config::{BinarizeConfig, MarkerConfig};
use gridtrace::pipeline::{self, CalibrateOptions, CalibrationSource, ConvertOptions};
use gridtrace::TraceError;
use tracing::{error, info};

/// Trace photographed tools into grid-aligned SVG plates
#[derive(Parser, Debug)]
#[command(name = "gridtrace")]
#[command(about = "Trace tool photos into grid-aligned SVG plates", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a scaling factor from a photo of a square of known width
    Calibrate {
        /// Photo of the reference square
        file: PathBuf,

        /// Physical width of the reference square
        #[arg(long, default_value = "10")]
        known_width: f64,

        /// Where to store the scaling factor
        #[arg(long, default_value = "config.yaml")]
        output_config_file: PathBuf,

        /// Width measured in CAD (skips the prompt)
        #[arg(long)]
        measurement: Option<f64>,

        /// Directory for the reference SVGs
        #[arg(long, default_value = "images/svg")]
        output_dir: PathBuf,
    },

    /// Convert a tool photo into a plate SVG
    Convert {
        /// Photo of the tool on white paper
        file: PathBuf,

        /// Calibration store written by `calibrate`
        #[arg(long, default_value = "config.yaml")]
        config_filepath: PathBuf,

        /// Units per pixel; overrides every other calibration source when > 0
        #[arg(long, default_value = "0")]
        scaling_factor: f64,

        /// Only draw the tool outline
        #[arg(long)]
        no_dugout: bool,

        /// Calibrate from a printed marker of this side length
        #[arg(long)]
        marker_size: Option<f64>,

        /// Dictionary id of the printed marker
        #[arg(long, default_value = "7")]
        marker_id: u32,

        /// Directory for the SVG
        #[arg(long, default_value = "images/svg")]
        output_dir: PathBuf,

        /// Save intermediate images next to the SVG
        #[arg(short, long)]
        debug: bool,
    },

    /// Check that the calibration marker is found in a photo
    Aruco {
        /// Photo containing the marker
        file: PathBuf,

        /// Printed side length of the marker
        #[arg(long, default_value = "40")]
        marker_size: f64,

        /// Dictionary id of the printed marker
        #[arg(long, default_value = "7")]
        marker_id: u32,
    },
}

/// Reads the CAD measurement from the terminal, asking again until it parses
struct StdinMeasurement;

impl MeasurementProvider for StdinMeasurement {
    fn measure(&mut self, prompt: &str) -> gridtrace::Result<f64> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("{}: ", prompt);
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                return Err(TraceError::calibration("no measurement entered"));
            };
            match line?.trim().parse::<f64>() {
                Ok(value) => return Ok(value),
                Err(_) => println!("Please enter a number"),
            }
        }
    }
}

fn require_file(path: &Path) {
    if !path.is_file() {
        error!("{} does not exist", path.display());
        std::process::exit(1);
    }
}

fn marker_config(marker_size: f64, marker_id: u32) -> MarkerConfig {
    MarkerConfig {
        side_length: marker_size,
        marker_id,
        ..MarkerConfig::default()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    gridtrace::init_logging(cli.verbose)?;

    match cli.command {
        Command::Calibrate {
            file,
            known_width,
            output_config_file,
            measurement,
            output_dir,
        } => {
            require_file(&file);
            let opts = CalibrateOptions {
                known_width,
                store_path: output_config_file,
                output_dir,
                ..CalibrateOptions::new(file)
            };
            let factor = match measurement {
                Some(value) => pipeline::calibrate(&opts, &mut FixedMeasurement(value)),
                None => pipeline::calibrate(&opts, &mut StdinMeasurement),
            }
            .context("calibration failed")?;
            info!(
                "Saved scaling factor {:.6} to {}",
                factor,
                opts.store_path.display()
            );
        }

        Command::Convert {
            file,
            config_filepath,
            scaling_factor,
            no_dugout,
            marker_size,
            marker_id,
            output_dir,
            debug,
        } => {
            require_file(&file);
            let source =
                CalibrationSource::select(scaling_factor, marker_size.is_some(), &config_filepath);
            let defaults = MarkerConfig::default();
            let opts = ConvertOptions {
                output_dir,
                with_cutout: !no_dugout,
                debug,
                marker: marker_config(marker_size.unwrap_or(defaults.side_length), marker_id),
                ..ConvertOptions::new(&file, source)
            };
            let report = pipeline::convert(&opts)
                .with_context(|| format!("failed to convert {}", file.display()))?;
            info!(
                "Wrote {} ({} x {} grid units)",
                report.svg_path.display(),
                report.layout.width_units,
                report.layout.height_units
            );
        }

        Command::Aruco {
            file,
            marker_size,
            marker_id,
        } => {
            require_file(&file);
            let marker = marker_config(marker_size, marker_id);
            if let Some(found) = pipeline::aruco(&file, &BinarizeConfig::default(), &marker)? {
                info!("Marker {} found, perimeter {:.1}px", marker.marker_id, found.perimeter);
            }
        }
    }

    Ok(())
}
