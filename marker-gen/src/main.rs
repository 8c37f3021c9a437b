use anyhow::Result;
use clap::Parser;
use gridtrace_common::PaperSize;
use std::path::PathBuf;
use tracing::info;

mod marker_generator;
mod marker_placement;
mod pdf_generator;

use pdf_generator::PdfGenerator;

/// Generate a printable calibration marker for `gridtrace convert --marker-size`
#[derive(Parser, Debug)]
#[command(name = "marker-gen")]
#[command(about = "Generate a printable DICT_4X4_50 calibration marker", long_about = None)]
struct Args {
    /// Marker id in the dictionary (0-49)
    #[arg(long, default_value = "7")]
    id: u32,

    /// Printed side length of the black square in millimeters
    #[arg(short, long, default_value = "40.0")]
    size: f64,

    /// Paper size
    #[arg(short, long, value_enum, default_value = "a4")]
    paper: PaperSizeArg,

    /// Output PDF file path
    #[arg(short, long, default_value = "marker.pdf")]
    output: PathBuf,

    /// Also write the marker as a PNG
    #[arg(long)]
    png: Option<PathBuf>,

    /// PNG resolution
    #[arg(long, default_value = "20")]
    pixels_per_cell: u32,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PaperSizeArg {
    A4,
    Letter,
    A3,
}

impl From<PaperSizeArg> for PaperSize {
    fn from(arg: PaperSizeArg) -> Self {
        match arg {
            PaperSizeArg::A4 => PaperSize::A4,
            PaperSizeArg::Letter => PaperSize::Letter,
            PaperSizeArg::A3 => PaperSize::A3,
        }
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();
    let paper_size: PaperSize = args.paper.into();

    info!("Generating calibration marker:");
    info!("  Paper size: {}", paper_size);
    info!("  Marker: id {}, {}mm", args.id, args.size);
    info!("  Output: {}", args.output.display());

    let generator = PdfGenerator::new(paper_size, args.id, args.size);
    generator.generate(&args.output)?;
    info!("PDF generated successfully: {}", args.output.display());

    if let Some(png_path) = &args.png {
        marker_generator::generate_and_save_marker(args.id, args.pixels_per_cell, png_path)?;
    }

    Ok(())
}
