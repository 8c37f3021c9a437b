use anyhow::{bail, Result};
use gridtrace_common::{PaperSize, MARKER_GRID_CELLS};
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Line, LineDashPattern, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rect,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::marker_generator::{marker_cells, QUIET_ZONE_CELLS};
use crate::marker_placement::{fits_on_paper, marker_origin, PRINTABLE_MARGIN_MM};

/// Length of the print check ruler
const RULER_LENGTH_MM: f64 = 50.0;

/// One filled square in page coordinates (mm, origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSquare {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

pub struct PdfGenerator {
    paper_size: PaperSize,
    marker_id: u32,
    marker_size_mm: f64,
}

impl PdfGenerator {
    pub fn new(paper_size: PaperSize, marker_id: u32, marker_size_mm: f64) -> Self {
        Self {
            paper_size,
            marker_id,
            marker_size_mm,
        }
    }

    fn cell_mm(&self) -> f64 {
        self.marker_size_mm / MARKER_GRID_CELLS as f64
    }

    /// Black cells of the marker as vector squares
    ///
    /// Drawing cells as filled rectangles keeps the printed side exactly
    /// `marker_size_mm`, with no raster scaling involved.
    pub fn black_cells(&self) -> Result<Vec<CellSquare>> {
        let cells = marker_cells(self.marker_id)?;
        let (x0, y0) = marker_origin(self.paper_size, self.marker_size_mm);
        let cell = self.cell_mm();

        let mut squares = Vec::new();
        for (r, row) in cells.iter().enumerate() {
            for (c, &black) in row.iter().enumerate() {
                if black {
                    // rows count from the top, PDF y from the bottom
                    squares.push(CellSquare {
                        x: x0 + c as f64 * cell,
                        y: y0 + self.marker_size_mm - (r + 1) as f64 * cell,
                        size: cell,
                    });
                }
            }
        }
        Ok(squares)
    }

    pub fn generate(&self, output_path: &Path) -> Result<()> {
        let quiet_zone = QUIET_ZONE_CELLS as f64 * self.cell_mm();
        if !fits_on_paper(self.paper_size, self.marker_size_mm, quiet_zone) {
            bail!(
                "A {}mm marker does not fit on {} paper",
                self.marker_size_mm,
                self.paper_size
            );
        }

        let (width_mm, height_mm) = self.paper_size.dimensions_mm();
        let (doc, page1, layer1) = PdfDocument::new(
            "gridtrace calibration marker",
            Mm(width_mm as f32),
            Mm(height_mm as f32),
            "Layer 1",
        );
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc.add_builtin_font(BuiltinFont::Helvetica)?;

        self.add_labels(&layer, &font);
        self.draw_cut_outline(&layer, quiet_zone);
        self.draw_ruler(&layer);
        self.draw_marker(&layer)?;

        save(doc, output_path)
    }

    fn add_labels(&self, layer: &PdfLayerReference, font: &IndirectFontRef) {
        let (_, height_mm) = self.paper_size.dimensions_mm();
        let title = format!("gridtrace calibration marker - {}", self.paper_size);
        layer.use_text(
            title,
            10.0,
            Mm(PRINTABLE_MARGIN_MM as f32),
            Mm((height_mm - PRINTABLE_MARGIN_MM - 3.0) as f32),
            font,
        );

        let (_, y0) = marker_origin(self.paper_size, self.marker_size_mm);
        let caption = format!(
            "DICT_4X4_50 id {} - side {}mm - convert with --marker-size {} --marker-id {}",
            self.marker_id, self.marker_size_mm, self.marker_size_mm, self.marker_id
        );
        layer.use_text(
            caption,
            8.0,
            Mm(PRINTABLE_MARGIN_MM as f32),
            Mm((y0 + self.marker_size_mm + self.cell_mm() + 4.0) as f32),
            font,
        );
    }

    fn draw_cut_outline(&self, layer: &PdfLayerReference, quiet_zone: f64) {
        let (x0, y0) = marker_origin(self.paper_size, self.marker_size_mm);
        let (left, bottom) = (x0 - quiet_zone, y0 - quiet_zone);
        let side = self.marker_size_mm + 2.0 * quiet_zone;

        layer.set_outline_thickness(0.3);
        layer.set_outline_color(Color::Greyscale(Greyscale::new(0.6, None)));
        layer.set_line_dash_pattern(LineDashPattern {
            dash_1: Some(3),
            ..LineDashPattern::default()
        });
        layer.add_line(Line {
            points: vec![
                (point(left, bottom), false),
                (point(left + side, bottom), false),
                (point(left + side, bottom + side), false),
                (point(left, bottom + side), false),
            ],
            is_closed: true,
        });
        layer.set_line_dash_pattern(LineDashPattern::default());
    }

    /// Millimeter ruler below the marker to check the printer did not scale the page
    fn draw_ruler(&self, layer: &PdfLayerReference) {
        let (width_mm, _) = self.paper_size.dimensions_mm();
        let (_, y0) = marker_origin(self.paper_size, self.marker_size_mm);
        let start_x = (width_mm - RULER_LENGTH_MM) / 2.0;
        let base_y = (y0 / 2.0).max(PRINTABLE_MARGIN_MM + 2.0);

        layer.set_outline_thickness(0.5);
        layer.set_outline_color(Color::Greyscale(Greyscale::new(0.0, None)));
        layer.add_line(Line {
            points: vec![
                (point(start_x, base_y), false),
                (point(start_x + RULER_LENGTH_MM, base_y), false),
            ],
            is_closed: false,
        });

        for i in 0..=RULER_LENGTH_MM as i32 {
            let tick_height = if i % 10 == 0 {
                3.0
            } else if i % 5 == 0 {
                2.0
            } else {
                1.0
            };
            let x = start_x + i as f64;
            layer.add_line(Line {
                points: vec![(point(x, base_y), false), (point(x, base_y + tick_height), false)],
                is_closed: false,
            });
        }
    }

    fn draw_marker(&self, layer: &PdfLayerReference) -> Result<()> {
        layer.set_fill_color(Color::Greyscale(Greyscale::new(0.0, None)));
        for square in self.black_cells()? {
            layer.add_rect(
                Rect::new(
                    Mm(square.x as f32),
                    Mm(square.y as f32),
                    Mm((square.x + square.size) as f32),
                    Mm((square.y + square.size) as f32),
                )
                .with_mode(PaintMode::Fill),
            );
        }
        Ok(())
    }
}

fn point(x: f64, y: f64) -> Point {
    Point::new(Mm(x as f32), Mm(y as f32))
}

fn save(doc: PdfDocumentReference, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(&mut BufWriter::new(File::create(output_path)?))?;
    Ok(())
}
