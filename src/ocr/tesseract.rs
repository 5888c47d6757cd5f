use anyhow::{Context, Result, anyhow};
use image::ImageFormat;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::preprocess::{prepare_page, upscale_factor};
use super::tsv::parse_tsv_detections;
use super::{Detection, OcrEngine};

const TESSERACT_BIN: &str = "tesseract";

/// Runs the `tesseract` CLI on each page and folds its TSV words into line detections.
pub struct TesseractEngine {
    languages: String,
    psm: u32,
}

impl TesseractEngine {
    /// Fails when none of the requested languages are installed. Languages are passed
    /// through unchecked if tesseract cannot list them.
    pub fn new(languages: &str, psm: u32) -> Result<Self> {
        let requested = languages.trim();
        if requested.is_empty() {
            return Err(anyhow!("ocr.languages is empty"));
        }
        let languages = match list_tesseract_languages() {
            Ok(installed) => select_languages(requested, &installed)?,
            Err(err) => {
                debug!("cannot list tesseract languages: {:#}", err);
                requested.to_string()
            }
        };
        Ok(Self { languages, psm })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        TESSERACT_BIN
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let page = image::open(image_path)
            .with_context(|| format!("failed to decode image for OCR: {}", image_path.display()))?;
        let scale = upscale_factor(page.width());
        let prepared = prepare_page(&page, scale);

        let input = tempfile::Builder::new()
            .prefix("page-")
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        prepared
            .save_with_format(input.path(), ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;

        let output = Command::new(TESSERACT_BIN)
            .args(tesseract_args(input.path(), &self.languages, self.psm))
            .output()
            .with_context(|| "failed to run tesseract (is it installed?)")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr.trim()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let detections = parse_tsv_detections(&tsv, scale as f32);
        debug!(
            "tesseract found {} lines in {}",
            detections.len(),
            image_path.display()
        );
        Ok(detections)
    }
}

fn tesseract_args(input: &Path, languages: &str, psm: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![input.into(), "stdout".into()];
    for arg in ["-l", languages, "--oem", "1", "--psm"] {
        args.push(arg.into());
    }
    args.push(psm.to_string().into());
    for arg in ["--dpi", "300", "tsv"] {
        args.push(arg.into());
    }
    args
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new(TESSERACT_BIN)
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
}

/// `--list-langs` prints a header line followed by one language per line.
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps the installed subset of `requested` (split on `+`, `,` or spaces) joined
/// with `+`.
fn select_languages(requested: &str, installed: &[String]) -> Result<String> {
    let (chosen, missing): (Vec<&str>, Vec<&str>) = requested
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .partition(|lang| installed.iter().any(|value| value == lang));

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not installed: {} (installed: {})",
            missing.join(", "),
            installed.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!("ignoring ocr language(s) that are not installed: {}", missing.join(", "));
    }
    Ok(chosen.join("+"))
}
