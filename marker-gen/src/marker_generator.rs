/// DICT_4X4_50 marker raster generator
///
/// A marker is a 6x6 cell grid: a one-cell black border around 4x4 data
/// cells. The raster adds a one-cell white quiet zone on every side, so the
/// image is 8x8 cells.
use anyhow::{anyhow, Result};
use gridtrace_common::{MarkerDictionary, MARKER_GRID_CELLS};
use image::{GrayImage, Luma};
use std::path::Path;
use tracing::info;

/// White cells around the black border
pub const QUIET_ZONE_CELLS: u32 = 1;

/// Cell grid of a marker, `true` meaning black
pub fn marker_cells(marker_id: u32) -> Result<[[bool; MARKER_GRID_CELLS]; MARKER_GRID_CELLS]> {
    let dictionary = MarkerDictionary::default();
    dictionary.cell_pattern(marker_id).ok_or_else(|| {
        anyhow!(
            "Marker ID {} not found (only 0-{} supported)",
            marker_id,
            dictionary.len() - 1
        )
    })
}

/// Render a marker with its quiet zone
///
/// # Arguments
/// * `marker_id` - Dictionary id (0-49)
/// * `pixels_per_cell` - Edge length of one cell in pixels
pub fn generate_marker(marker_id: u32, pixels_per_cell: u32) -> Result<GrayImage> {
    if pixels_per_cell == 0 {
        return Err(anyhow!("pixels per cell must be at least 1"));
    }
    let cells = marker_cells(marker_id)?;
    let grid = MARKER_GRID_CELLS as u32 + 2 * QUIET_ZONE_CELLS;
    let size = grid * pixels_per_cell;

    Ok(GrayImage::from_fn(size, size, |x, y| {
        let cx = x / pixels_per_cell;
        let cy = y / pixels_per_cell;
        let in_marker = (QUIET_ZONE_CELLS..grid - QUIET_ZONE_CELLS).contains(&cx)
            && (QUIET_ZONE_CELLS..grid - QUIET_ZONE_CELLS).contains(&cy);
        let black = in_marker
            && cells[(cy - QUIET_ZONE_CELLS) as usize][(cx - QUIET_ZONE_CELLS) as usize];
        if black {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    }))
}

/// Generate a marker and save it as a PNG file
pub fn generate_and_save_marker(marker_id: u32, pixels_per_cell: u32, output_path: &Path) -> Result<()> {
    let img = generate_marker(marker_id, pixels_per_cell)?;
    img.save(output_path)?;
    info!("Generated marker ID {} -> {}", marker_id, output_path.display());
    Ok(())
}
