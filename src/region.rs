use serde::Serialize;

use crate::geometry::{BoundingRect, Point, Quad};

/// Integer pixel rectangle covering a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl RegionRect {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    /// Moves every edge inward by `padding`. `None` when nothing is left to draw into.
    pub fn shrink(&self, padding: i32) -> Option<RegionRect> {
        let shrunk = RegionRect {
            min_x: self.min_x + padding,
            min_y: self.min_y + padding,
            max_x: self.max_x - padding,
            max_y: self.max_y - padding,
        };
        if shrunk.width() <= 0 || shrunk.height() <= 0 {
            return None;
        }
        Some(shrunk)
    }
}

/// Union rectangle over every corner of every polygon, truncated to whole pixels.
pub fn consolidate(polygons: &[Quad]) -> Option<RegionRect> {
    let points: Vec<Point> = polygons
        .iter()
        .flat_map(|quad| quad.points().iter().copied())
        .collect();
    let rect = BoundingRect::from_points(&points)?;
    Some(RegionRect {
        min_x: rect.min_x as i32,
        min_y: rect.min_y as i32,
        max_x: rect.max_x as i32,
        max_y: rect.max_y as i32,
    })
}

/// Consolidated and padded region, or `None` when the group should not be rendered.
pub fn typeset_region(polygons: &[Quad], padding: i32) -> Option<RegionRect> {
    consolidate(polygons)?.shrink(padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_all_polygons() {
        let polygons = vec![
            Quad::from_pairs(&[[10.7, 12.0], [80.0, 10.2], [81.9, 30.0], [11.0, 32.0]]).unwrap(),
            Quad::from_rect(20.0, 40.0, 40.0, 18.5),
        ];
        let region = consolidate(&polygons).expect("region");
        assert_eq!(
            region,
            RegionRect {
                min_x: 10,
                min_y: 10,
                max_x: 81,
                max_y: 58
            }
        );
    }

    #[test]
    fn empty_group_has_no_region() {
        assert!(consolidate(&[]).is_none());
    }

    #[test]
    fn padding_shrinks_every_edge() {
        let region = RegionRect {
            min_x: 0,
            min_y: 0,
            max_x: 100,
            max_y: 40,
        };
        assert_eq!(
            region.shrink(5),
            Some(RegionRect {
                min_x: 5,
                min_y: 5,
                max_x: 95,
                max_y: 35
            })
        );
        assert_eq!(region.shrink(0), Some(region));
    }

    #[test]
    fn collapsed_region_is_skipped() {
        let polygons = vec![Quad::from_rect(0.0, 0.0, 100.0, 10.0)];
        assert!(typeset_region(&polygons, 5).is_none());
        assert!(typeset_region(&polygons, 4).is_some());
    }
}
