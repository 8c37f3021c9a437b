use serde::{Deserialize, Serialize};
use std::fmt;

/// Paper size variants with dimensions in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PaperSize {
    /// A4: 210 × 297 mm
    A4,
    /// US Letter: 215.9 × 279.4 mm (8.5 × 11 inches)
    Letter,
    /// A3: 297 × 420 mm
    A3,
}

impl PaperSize {
    /// Returns (width, height) in millimeters
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::A3 => (297.0, 420.0),
        }
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSize::A4 => write!(f, "A4 (210×297mm)"),
            PaperSize::Letter => write!(f, "Letter (8.5×11in)"),
            PaperSize::A3 => write!(f, "A3 (297×420mm)"),
        }
    }
}

/// Integer point in image (pixel) coordinates, y pointing down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_f64(self) -> Point2D {
        Point2D::new(self.x as f64, self.y as f64)
    }
}

/// 2D point with floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned bounding box in pixels.
///
/// Width and height count pixels inclusively, so a box spanning x = 2..=5
/// has width 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn center(&self) -> Point2D {
        Point2D::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Area shared with another box, zero when they are disjoint
    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) as i64 * (bottom - top) as i64
    }
}

/// Closed polygon of integer points.
///
/// The first and last points are distinct and implicitly joined. A contour
/// always holds at least three points and no operation reorders them; every
/// transform hands back a new contour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contour {
    points: Vec<PixelPoint>,
}

impl Contour {
    /// Returns `None` for fewer than three points
    pub fn new(points: Vec<PixelPoint>) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        Some(Self { points })
    }

    pub fn points(&self) -> &[PixelPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Signed shoelace area, positive when the points run clockwise on screen
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64)
            .sum::<f64>()
            / 2.0
    }

    /// Enclosed area in square pixels
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Length of the closed outline
    pub fn perimeter(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.to_f64().distance(&b.to_f64()))
            .sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    /// Area-weighted centroid from the polygon's first-order moments.
    ///
    /// Returns `None` when the polygon encloses no area.
    pub fn centroid(&self) -> Option<Point2D> {
        let mut m00 = 0.0;
        let mut m10 = 0.0;
        let mut m01 = 0.0;
        for (a, b) in self.edges() {
            let (xa, ya, xb, yb) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
            let cross = xa * yb - xb * ya;
            m00 += cross;
            m10 += (xa + xb) * cross;
            m01 += (ya + yb) * cross;
        }
        m00 /= 2.0;
        if m00.abs() < f64::EPSILON {
            return None;
        }
        Some(Point2D::new(m10 / (6.0 * m00), m01 / (6.0 * m00)))
    }

    /// Apply a point-wise mapping, keeping count and order
    pub fn map_points<F>(&self, f: F) -> Contour
    where
        F: FnMut(&PixelPoint) -> PixelPoint,
    {
        Contour {
            points: self.points.iter().map(f).collect(),
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Contour {
        self.map_points(|p| PixelPoint::new(p.x + dx, p.y + dy))
    }

    fn edges(&self) -> impl Iterator<Item = (PixelPoint, PixelPoint)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// Physical units per pixel, always positive and finite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFactor(f64);

impl CalibrationFactor {
    pub fn new(units_per_pixel: f64) -> Option<Self> {
        if units_per_pixel.is_finite() && units_per_pixel > 0.0 {
            Some(Self(units_per_pixel))
        } else {
            None
        }
    }

    pub fn units_per_pixel(&self) -> f64 {
        self.0
    }

    pub fn pixels_per_unit(&self) -> f64 {
        1.0 / self.0
    }
}

impl fmt::Display for CalibrationFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} units/px", self.0)
    }
}

/// Stroke and fill attributes of a vector shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke: String,
    pub fill: String,
    pub stroke_width: f64,
}

impl Style {
    pub fn outline(stroke: &str, stroke_width: f64) -> Self {
        Self {
            stroke: stroke.to_string(),
            fill: "none".to_string(),
            stroke_width,
        }
    }

    pub fn with_fill(mut self, fill: &str) -> Self {
        self.fill = fill.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    MoveTo(Point2D),
    LineTo(Point2D),
    Close,
}

/// Vector shape primitive.
///
/// `scale` is a uniform transform applied around the document origin, used to
/// turn physical units into output units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        corner_radius: f64,
        style: Style,
        scale: f64,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        style: Style,
        scale: f64,
    },
    Path {
        segments: Vec<PathSegment>,
        style: Style,
        scale: f64,
    },
}

impl Shape {
    /// Closed path through every contour point
    pub fn closed_path(contour: &Contour, style: Style) -> Shape {
        let mut segments = Vec::with_capacity(contour.len() + 1);
        for (i, p) in contour.points().iter().enumerate() {
            let point = p.to_f64();
            segments.push(if i == 0 {
                PathSegment::MoveTo(point)
            } else {
                PathSegment::LineTo(point)
            });
        }
        segments.push(PathSegment::Close);
        Shape::Path {
            segments,
            style,
            scale: 1.0,
        }
    }
}

/// Drawing with explicit dimensions and shapes in z-order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
}

impl VectorDocument {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            shapes: Vec::new(),
        }
    }
}
