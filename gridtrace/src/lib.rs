// gridtrace library
// Photo of a tool on white paper -> grid-aligned plate drawing

pub mod alignment;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod error;
pub mod export_svg;
pub mod layout;
pub mod pipeline;
pub mod segmentation;
pub mod smoothing;

pub use error::{Result, TraceError};

/// Install the stderr log subscriber
///
/// `RUST_LOG` sets the filter when present (INFO otherwise); `verbose` adds a
/// debug directive on top of it.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let env = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(log_filter(verbose, env.as_deref()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn log_filter(verbose: bool, env: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    let filter = match env.map(str::trim) {
        Some(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new("info"),
    };
    if verbose {
        filter.add_directive(tracing::Level::DEBUG.into())
    } else {
        filter
    }
}
