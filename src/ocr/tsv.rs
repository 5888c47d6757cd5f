use std::collections::HashMap;

use super::Detection;
use crate::geometry::Quad;

struct WordToken {
    text: String,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

/// Folds tesseract word rows (level 5) into one detection per text line.
///
/// Coordinates are divided by `scale` to map an upscaled OCR input back onto the page.
pub(super) fn parse_tsv_detections(tsv: &str, scale: f32) -> Vec<Detection> {
    let mut order: Vec<(i32, i32, i32, i32)> = Vec::new();
    let mut lines: HashMap<(i32, i32, i32, i32), Vec<WordToken>> = HashMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);

        let words = lines.entry(key).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        words.push(WordToken {
            text: text.to_string(),
            left,
            top,
            right: left + width,
            bottom: top + height,
        });
    }

    let scale = scale.max(1.0);
    let mut detections = Vec::new();
    for key in order {
        let Some(mut words) = lines.remove(&key) else {
            continue;
        };
        words.sort_by_key(|word| word.left);
        if let Some(detection) = build_detection(&words, scale) {
            detections.push(detection);
        }
    }
    detections
}

fn build_detection(words: &[WordToken], scale: f32) -> Option<Detection> {
    let first = words.first()?;
    let text = words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let (mut left, mut top, mut right, mut bottom) = (first.left, first.top, first.right, first.bottom);
    for word in &words[1..] {
        left = left.min(word.left);
        top = top.min(word.top);
        right = right.max(word.right);
        bottom = bottom.max(word.bottom);
    }
    if right <= left || bottom <= top {
        return None;
    }

    Some(Detection {
        polygon: Quad::from_rect(
            left as f32 / scale,
            top as f32 / scale,
            (right - left) as f32 / scale,
            (bottom - top) as f32 / scale,
        ),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn words_fold_into_lines() {
        let tsv = [
            HEADER,
            "4\t1\t1\t1\t1\t0\t10\t20\t200\t30\t-1\t",
            "5\t1\t1\t1\t1\t2\t90\t22\t60\t28\t91.2\tTHERE",
            "5\t1\t1\t1\t1\t1\t10\t20\t70\t30\t95.0\tHELLO",
            "5\t1\t1\t1\t2\t1\t12\t60\t40\t30\t88.0\tBYE",
            "5\t1\t1\t1\t2\t2\t60\t60\t40\t30\t-1\t",
        ]
        .join("\n");
        let detections = parse_tsv_detections(&tsv, 2.0);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text, "HELLO THERE");
        let rect = detections[0].polygon.bounding_rect();
        assert_eq!((rect.min_x, rect.min_y, rect.max_x, rect.max_y), (5.0, 10.0, 75.0, 25.0));
        assert_eq!(detections[1].text, "BYE");
    }

    #[test]
    fn empty_output_yields_nothing() {
        assert!(parse_tsv_detections(HEADER, 1.0).is_empty());
    }
}
