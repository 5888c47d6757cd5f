use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A detection outline: four corners, not necessarily axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    pub fn from_rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Quad([
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    }

    /// Builds a quad from loosely typed `[x, y]` pairs as emitted by OCR engines.
    pub fn from_pairs(points: &[[f32; 2]]) -> Result<Self> {
        if points.len() != 4 {
            return Err(anyhow!(
                "polygon must have exactly 4 points (got {})",
                points.len()
            ));
        }
        let mut corners = [Point::new(0.0, 0.0); 4];
        for (corner, pair) in corners.iter_mut().zip(points) {
            if !pair[0].is_finite() || !pair[1].is_finite() {
                return Err(anyhow!("polygon contains a non-finite coordinate"));
            }
            *corner = Point::new(pair[0], pair[1]);
        }
        Ok(Quad(corners))
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn bounding_rect(&self) -> BoundingRect {
        BoundingRect::from_points(&self.0).unwrap_or(BoundingRect {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingRect {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = BoundingRect {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for point in &points[1..] {
            rect.min_x = rect.min_x.min(point.x);
            rect.min_y = rect.min_y.min(point.y);
            rect.max_x = rect.max_x.max(point.x);
            rect.max_y = rect.max_y.max(point.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Distance between the closer pair of edges of two intervals; zero when they overlap.
pub fn axis_gap(start_a: f32, end_a: f32, start_b: f32, end_b: f32) -> f32 {
    (start_a.max(start_b) - end_a.min(end_b)).max(0.0)
}

/// Horizontal and vertical gaps between two rects.
pub fn rect_gap(a: &BoundingRect, b: &BoundingRect) -> (f32, f32) {
    (
        axis_gap(a.min_x, a.max_x, b.min_x, b.max_x),
        axis_gap(a.min_y, a.max_y, b.min_y, b.max_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_rect_of_rotated_quad() {
        let quad = Quad::from_pairs(&[[10.0, 5.0], [30.0, 0.0], [35.0, 20.0], [12.0, 25.0]])
            .expect("quad");
        let rect = quad.bounding_rect();
        assert_eq!(rect.min_x, 10.0);
        assert_eq!(rect.min_y, 0.0);
        assert_eq!(rect.max_x, 35.0);
        assert_eq!(rect.max_y, 25.0);
    }

    #[test]
    fn rejects_wrong_point_count() {
        let err = Quad::from_pairs(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert!(err.to_string().contains("exactly 4 points"));
    }

    #[test]
    fn gap_is_zero_on_overlap() {
        let a = Quad::from_rect(0.0, 0.0, 50.0, 10.0).bounding_rect();
        let b = Quad::from_rect(40.0, 30.0, 50.0, 10.0).bounding_rect();
        assert_eq!(rect_gap(&a, &b), (0.0, 20.0));
        assert_eq!(rect_gap(&b, &a), (0.0, 20.0));
    }
}
