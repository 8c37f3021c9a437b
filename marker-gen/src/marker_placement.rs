use gridtrace_common::PaperSize;

/// Distance from the paper edge that every printer can reach
pub const PRINTABLE_MARGIN_MM: f64 = 15.0;

/// Lower-left corner of the marker's black square, in millimeters from the
/// bottom-left paper corner. The marker sits centered on the page.
pub fn marker_origin(paper_size: PaperSize, marker_size_mm: f64) -> (f64, f64) {
    let (width_mm, height_mm) = paper_size.dimensions_mm();
    ((width_mm - marker_size_mm) / 2.0, (height_mm - marker_size_mm) / 2.0)
}

/// Whether the marker plus its quiet zone stays inside the printable area
pub fn fits_on_paper(paper_size: PaperSize, marker_size_mm: f64, quiet_zone_mm: f64) -> bool {
    let (width_mm, height_mm) = paper_size.dimensions_mm();
    let needed = marker_size_mm + 2.0 * quiet_zone_mm + 2.0 * PRINTABLE_MARGIN_MM;
    marker_size_mm > 0.0 && needed <= width_mm && needed <= height_mm
}
