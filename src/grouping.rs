use serde::Serialize;
use std::cmp::Ordering;

use crate::geometry::{BoundingRect, Quad, rect_gap};
use crate::ocr::Detection;

pub const DEFAULT_GAP_THRESHOLD: f32 = 20.0;

#[derive(Debug, Clone, Copy)]
pub struct GroupingConfig {
    pub x_threshold: f32,
    pub y_threshold: f32,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            x_threshold: DEFAULT_GAP_THRESHOLD,
            y_threshold: DEFAULT_GAP_THRESHOLD,
        }
    }
}

/// One balloon: detections sorted top to bottom.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub members: Vec<Detection>,
}

impl Group {
    pub fn top(&self) -> f32 {
        self.members
            .iter()
            .map(|member| member.polygon.bounding_rect().min_y)
            .fold(f32::INFINITY, f32::min)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.members
            .iter()
            .map(|member| member.text.as_str())
            .collect()
    }

    pub fn polygons(&self) -> Vec<Quad> {
        self.members.iter().map(|member| member.polygon).collect()
    }
}

/// Clusters one page's detections into balloons.
///
/// Two detections are linked when both their horizontal and vertical edge gaps are
/// within the thresholds (inclusive). Linked detections are merged transitively, so
/// the result is the set of connected components of that graph. Members of a group
/// and the groups themselves are ordered by ascending top edge; this order is the
/// page's reading order.
pub fn group_detections(detections: Vec<Detection>, config: &GroupingConfig) -> Vec<Group> {
    let n = detections.len();
    if n == 0 {
        return Vec::new();
    }

    let rects: Vec<BoundingRect> = detections
        .iter()
        .map(|detection| detection.polygon.bounding_rect())
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            let (x_gap, y_gap) = rect_gap(&rects[i], &rects[j]);
            if x_gap <= config.x_threshold && y_gap <= config.y_threshold {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut visited = vec![false; n];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut component = Vec::new();
        while let Some(current) = stack.pop() {
            component.push(current);
            for &neighbor in &adjacency[current] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }
        // ties on min_y keep detection order
        component.sort_unstable();
        component.sort_by(|a, b| compare_f32(rects[*a].min_y, rects[*b].min_y));
        components.push(component);
    }

    let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
    let mut groups: Vec<Group> = components
        .into_iter()
        .map(|component| Group {
            members: component
                .into_iter()
                .filter_map(|idx| slots[idx].take())
                .collect(),
        })
        .collect();
    groups.sort_by(|a, b| compare_f32(a.top(), b.top()));
    groups
}

fn compare_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, text: &str) -> Detection {
        Detection {
            polygon: Quad::from_rect(x, y, w, h),
            text: text.to_string(),
        }
    }

    fn all_texts(groups: &[Group]) -> Vec<Vec<&str>> {
        groups.iter().map(|group| group.texts()).collect()
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(group_detections(Vec::new(), &GroupingConfig::default()).is_empty());
    }

    #[test]
    fn single_detection_is_its_own_group() {
        let groups = group_detections(vec![det(5.0, 5.0, 10.0, 10.0, "A")], &GroupingConfig::default());
        assert_eq!(all_texts(&groups), vec![vec!["A"]]);
    }

    #[test]
    fn every_detection_lands_in_exactly_one_group() {
        let detections = vec![
            det(0.0, 0.0, 100.0, 20.0, "a1"),
            det(500.0, 0.0, 100.0, 20.0, "b1"),
            det(0.0, 30.0, 100.0, 20.0, "a2"),
            det(500.0, 400.0, 100.0, 20.0, "c1"),
            det(510.0, 25.0, 80.0, 20.0, "b2"),
            det(0.0, 900.0, 10.0, 10.0, "d1"),
        ];
        let groups = group_detections(detections, &GroupingConfig::default());
        let mut seen: Vec<&str> = groups.iter().flat_map(|group| group.texts()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a1", "a2", "b1", "b2", "c1", "d1"]);
        assert_eq!(groups.len(), 4);
    }

    #[test]
    fn groups_and_members_follow_top_edge() {
        let detections = vec![
            det(0.0, 300.0, 100.0, 20.0, "late"),
            det(400.0, 60.0, 100.0, 20.0, "second-bottom"),
            det(400.0, 40.0, 100.0, 20.0, "second-top"),
            det(0.0, 10.0, 100.0, 20.0, "first"),
        ];
        let groups = group_detections(detections, &GroupingConfig::default());
        assert_eq!(
            all_texts(&groups),
            vec![
                vec!["first"],
                vec!["second-top", "second-bottom"],
                vec!["late"],
            ]
        );
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let config = GroupingConfig::default();
        // x_gap == 20 and y_gap == 20
        let merged = group_detections(
            vec![
                det(0.0, 0.0, 50.0, 10.0, "a"),
                det(70.0, 30.0, 50.0, 10.0, "b"),
            ],
            &config,
        );
        assert_eq!(merged.len(), 1);

        // x_gap == 21
        let split = group_detections(
            vec![
                det(0.0, 0.0, 50.0, 10.0, "a"),
                det(71.0, 30.0, 50.0, 10.0, "b"),
            ],
            &config,
        );
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn both_axes_must_be_close() {
        // horizontally aligned but far apart vertically
        let groups = group_detections(
            vec![
                det(0.0, 0.0, 100.0, 10.0, "top"),
                det(0.0, 100.0, 100.0, 10.0, "bottom"),
            ],
            &GroupingConfig::default(),
        );
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn chains_merge_transitively() {
        let detections = vec![
            det(0.0, 0.0, 40.0, 10.0, "A"),
            det(50.0, 15.0, 40.0, 10.0, "B"),
            det(100.0, 30.0, 40.0, 10.0, "C"),
        ];
        let a = detections[0].polygon.bounding_rect();
        let c = detections[2].polygon.bounding_rect();
        let (x_gap, _) = rect_gap(&a, &c);
        assert!(x_gap > DEFAULT_GAP_THRESHOLD);

        let groups = group_detections(detections, &GroupingConfig::default());
        assert_eq!(all_texts(&groups), vec![vec!["A", "B", "C"]]);
    }

    #[test]
    fn thresholds_are_configurable() {
        let config = GroupingConfig {
            x_threshold: 0.0,
            y_threshold: 0.0,
        };
        let groups = group_detections(
            vec![
                det(0.0, 0.0, 50.0, 10.0, "a"),
                det(55.0, 0.0, 50.0, 10.0, "b"),
            ],
            &config,
        );
        assert_eq!(groups.len(), 2);
    }
}
