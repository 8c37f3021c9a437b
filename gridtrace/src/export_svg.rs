// SVG export module
// Serializes a vector document with explicit size and per-shape scale transforms

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use gridtrace_common::{PathSegment, Shape, Style, VectorDocument};
use tracing::info;

use crate::error::Result;

/// Render the document as an SVG string
pub fn render_svg(doc: &VectorDocument) -> String {
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{}" height="{}">"#,
        num(doc.width),
        num(doc.height)
    );

    for shape in &doc.shapes {
        let _ = writeln!(out, "  {}", render_shape(shape));
    }

    out.push_str("</svg>\n");
    out
}

fn render_shape(shape: &Shape) -> String {
    match shape {
        Shape::Rect {
            x,
            y,
            width,
            height,
            corner_radius,
            style,
            scale,
        } => {
            let mut el = format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}""#,
                num(*x),
                num(*y),
                num(*width),
                num(*height)
            );
            if *corner_radius > 0.0 {
                let _ = write!(el, r#" rx="{}""#, num(*corner_radius));
            }
            finish(el, style, *scale)
        }
        Shape::Circle { cx, cy, r, style, scale } => {
            let el = format!(
                r#"<circle cx="{}" cy="{}" r="{}""#,
                num(*cx),
                num(*cy),
                num(*r)
            );
            finish(el, style, *scale)
        }
        Shape::Path { segments, style, scale } => {
            let d: Vec<String> = segments
                .iter()
                .map(|seg| match seg {
                    PathSegment::MoveTo(p) => format!("M {},{}", num(p.x), num(p.y)),
                    PathSegment::LineTo(p) => format!("L {},{}", num(p.x), num(p.y)),
                    PathSegment::Close => "Z".to_string(),
                })
                .collect();
            let el = format!(r#"<path d="{}""#, d.join(" "));
            finish(el, style, *scale)
        }
    }
}

fn finish(mut el: String, style: &Style, scale: f64) -> String {
    let _ = write!(
        el,
        r#" stroke="{}" fill="{}" stroke-width="{}""#,
        style.stroke,
        style.fill,
        num(style.stroke_width)
    );
    if scale != 1.0 {
        let _ = write!(el, r#" transform="scale({}, {})""#, num(scale), num(scale));
    }
    el.push_str(" />");
    el
}

/// Format with at most three decimals and no trailing zeros
fn num(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Write the document to disk, creating the parent directory if needed
pub fn write_svg(doc: &VectorDocument, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, render_svg(doc))?;
    info!(
        "Exported {} shape(s) to SVG: {} ({} x {})",
        doc.shapes.len(),
        output_path.display(),
        num(doc.width),
        num(doc.height)
    );
    Ok(())
}
