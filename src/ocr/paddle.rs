use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{Detection, OcrEngine};
use crate::geometry::Quad;

/// Reads detections that PaddleOCR already wrote with `save_to_json`.
///
/// For a page `image_007.jpg` the engine looks for `image_007_res.json` (then
/// `image_007.json`) inside `dir`.
pub struct PaddleJsonEngine {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PaddleResult {
    #[serde(default)]
    rec_polys: Vec<Vec<[f32; 2]>>,
    #[serde(default)]
    rec_texts: Vec<String>,
}

impl PaddleJsonEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(anyhow!("paddle json directory not found: {}", dir.display()));
        }
        Ok(Self { dir })
    }

    fn result_path(&self, image_path: &Path) -> Result<PathBuf> {
        let stem = image_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("image path has no file name: {}", image_path.display()))?;
        let candidates = [
            self.dir.join(format!("{}_res.json", stem)),
            self.dir.join(format!("{}.json", stem)),
        ];
        candidates
            .iter()
            .find(|path| path.exists())
            .cloned()
            .ok_or_else(|| anyhow!("no paddle result for {} in {}", stem, self.dir.display()))
    }
}

impl OcrEngine for PaddleJsonEngine {
    fn name(&self) -> &'static str {
        "paddle-json"
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let path = self.result_path(image_path)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read paddle result: {}", path.display()))?;
        parse_paddle_result(&content)
            .with_context(|| format!("failed to parse paddle result: {}", path.display()))
    }
}

pub(super) fn parse_paddle_result(content: &str) -> Result<Vec<Detection>> {
    let parsed: PaddleResult = serde_json::from_str(content)?;
    if parsed.rec_polys.len() != parsed.rec_texts.len() {
        return Err(anyhow!(
            "rec_polys has {} entries but rec_texts has {}",
            parsed.rec_polys.len(),
            parsed.rec_texts.len()
        ));
    }
    parsed
        .rec_polys
        .iter()
        .zip(parsed.rec_texts)
        .enumerate()
        .map(|(idx, (points, text))| {
            let polygon = Quad::from_pairs(points).with_context(|| format!("detection {}", idx))?;
            Ok(Detection { polygon, text })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_polys_and_texts() {
        let json = r#"{
            "input_path": "page.jpg",
            "rec_texts": ["HEY", "YOU"],
            "rec_scores": [0.98, 0.91],
            "rec_polys": [
                [[10, 10], [60, 10], [60, 30], [10, 30]],
                [[12, 35], [58, 35], [58, 55], [12, 55]]
            ]
        }"#;
        let detections = parse_paddle_result(json).expect("parse");
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].text, "YOU");
        assert_eq!(detections[1].polygon.bounding_rect().min_y, 35.0);
    }

    #[test]
    fn malformed_polygon_is_rejected() {
        let json = r#"{"rec_texts": ["X"], "rec_polys": [[[0, 0], [1, 1]]]}"#;
        let err = parse_paddle_result(json).unwrap_err();
        assert!(format!("{:#}", err).contains("exactly 4 points"));
    }

    #[test]
    fn finds_result_next_to_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("image_001_res.json"),
            r#"{"rec_texts": [], "rec_polys": []}"#,
        )
        .expect("write");
        let engine = PaddleJsonEngine::new(dir.path()).expect("engine");
        let detections = engine.detect(Path::new("chapter/image_001.jpg")).expect("detect");
        assert!(detections.is_empty());
    }
}
