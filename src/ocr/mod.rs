mod paddle;
mod preprocess;
mod tesseract;
mod tsv;

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::path::Path;

use crate::geometry::Quad;
use crate::settings::OcrSettings;

pub use paddle::PaddleJsonEngine;
pub use tesseract::{TesseractEngine, list_tesseract_languages};

/// One recognized line: its outline and text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub polygon: Quad,
    pub text: String,
}

/// Text detection + recognition for a single page image.
///
/// An empty result means no text was found and is not an error.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrEngineKind {
    Tesseract,
    PaddleJson,
}

impl OcrEngineKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Some(OcrEngineKind::Tesseract),
            "paddle-json" | "paddle_json" | "paddle" => Some(OcrEngineKind::PaddleJson),
            _ => None,
        }
    }
}

pub fn build_engine(settings: &OcrSettings) -> Result<Box<dyn OcrEngine>> {
    match settings.engine {
        OcrEngineKind::Tesseract => Ok(Box::new(TesseractEngine::new(
            &settings.languages,
            settings.psm,
        )?)),
        OcrEngineKind::PaddleJson => {
            let dir = settings
                .json_dir
                .as_ref()
                .ok_or_else(|| anyhow!("ocr.json_dir is required for the paddle-json engine"))?;
            Ok(Box::new(PaddleJsonEngine::new(dir)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_parse() {
        assert_eq!(OcrEngineKind::parse("Tesseract"), Some(OcrEngineKind::Tesseract));
        assert_eq!(OcrEngineKind::parse("paddle-json"), Some(OcrEngineKind::PaddleJson));
        assert_eq!(OcrEngineKind::parse("easyocr"), None);
    }

    #[test]
    fn paddle_engine_is_built_from_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = OcrSettings {
            engine: OcrEngineKind::PaddleJson,
            json_dir: Some(dir.path().to_path_buf()),
            ..OcrSettings::default()
        };
        let engine = build_engine(&settings).expect("engine");
        assert_eq!(engine.name(), "paddle-json");

        let missing = OcrSettings {
            engine: OcrEngineKind::PaddleJson,
            ..OcrSettings::default()
        };
        assert!(build_engine(&missing).is_err());
    }
}
