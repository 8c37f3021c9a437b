pub mod dictionary;
pub mod types;

pub use dictionary::{MarkerDictionary, MarkerMatch, MARKER_GRID_CELLS};
pub use types::*;
