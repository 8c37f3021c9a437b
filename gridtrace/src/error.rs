//! Error types for the gridtrace pipeline.
//!
//! Every stage fails fast with one of these variants; nothing is retried.

use std::io;
use thiserror::Error;

/// Errors that abort a tracing run.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The input image is missing or cannot be decoded.
    #[error("input error: {0}")]
    Input(String),

    /// No usable contour or calibration marker was found.
    #[error("detection error: {0}")]
    Detection(String),

    /// A calibration value is missing, invalid or non-positive.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// The calibration store could not be parsed or written.
    #[error("config store error: {0}")]
    Store(#[from] serde_yaml::Error),

    /// I/O error while writing output files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A debug image could not be encoded.
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl TraceError {
    pub fn detection(msg: impl Into<String>) -> Self {
        TraceError::Detection(msg.into())
    }

    pub fn calibration(msg: impl Into<String>) -> Self {
        TraceError::Calibration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
