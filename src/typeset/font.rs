use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::{TextExtent, TextMeasure};
use crate::paths;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }

    fn advance_units(&self, text: &str) -> u32 {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return 0;
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(self.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance
    }
}

impl TextMeasure for FontMetrics {
    fn measure(&self, text: &str, font_size: f32) -> TextExtent {
        let scale = self.scale(font_size);
        let line_units = (self.ascender as i32 - self.descender as i32).max(1) as f32;
        TextExtent {
            width: self.advance_units(text) as f32 * scale,
            height: line_units * scale,
            ascent: self.ascender.max(0) as f32 * scale,
        }
    }
}

/// Width/height guesses from character classes, for when no font file is usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedMetrics;

impl TextMeasure for EstimatedMetrics {
    fn measure(&self, text: &str, font_size: f32) -> TextExtent {
        let units: f32 = text.chars().map(estimate_char_units).sum();
        TextExtent {
            width: units * font_size,
            height: font_size * 1.2,
            ascent: font_size * 0.95,
        }
    }
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF
    ) {
        1.0
    } else {
        0.6
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub metrics: FontMetrics,
    pub family: String,
    pub path: Option<PathBuf>,
}

/// Font file names (`.ttf`/`.otf`) inside `fonts_dir`, sorted.
pub fn available_fonts(fonts_dir: &Path) -> Result<Vec<String>> {
    if !fonts_dir.is_dir() {
        return Ok(Vec::new());
    }
    let files = paths::list_files_matching(fonts_dir, paths::FONT_PATTERNS)?;
    Ok(files
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .map(str::to_string)
        .collect())
}

/// Picks the font used for typesetting.
///
/// Order: `font_name` inside `fonts_dir`, then the first font in `fonts_dir`, then a
/// system font (`font_family`, or the first of `fallback` that resolves).
pub fn resolve_font(
    fonts_dir: &Path,
    font_name: Option<&str>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<ResolvedFont> {
    if let Some(name) = font_name {
        let candidate = fonts_dir.join(name);
        if candidate.exists() {
            return resolved_from_path(candidate, font_family);
        }
        warn!("font '{}' not found in {}", name, fonts_dir.display());
    }

    let available = available_fonts(fonts_dir)?;
    if let Some(first) = available.first() {
        if font_name.is_some() {
            warn!("falling back to font: {}", first);
        }
        return resolved_from_path(fonts_dir.join(first), font_family);
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return load_font_metrics_from_family(&db, family);
    }
    for candidate in fallback {
        if let Ok(resolved) = load_font_metrics_from_family(&db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!(
        "no fonts found in {} and no system fallback available",
        fonts_dir.display()
    ))
}

fn resolved_from_path(path: PathBuf, font_family: Option<&str>) -> Result<ResolvedFont> {
    let metrics = load_font_metrics(&path)?;
    let family = metrics
        .family()
        .map(str::to_string)
        .or_else(|| font_family.map(str::to_string))
        .unwrap_or_else(|| "sans-serif".to_string());
    Ok(ResolvedFont {
        metrics,
        family,
        path: Some(path),
    })
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: Arc::new(data.to_vec()),
            units_per_em,
            space_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<ResolvedFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, Some(family))?;
    let resolved_family = metrics
        .family()
        .map(str::to_string)
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedFont {
        metrics,
        family: resolved_family,
        path: None,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_font_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.otf", "a.TTF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        let fonts = available_fonts(dir.path()).expect("list");
        assert_eq!(fonts, vec!["a.TTF", "b.otf"]);
    }

    #[test]
    fn missing_fonts_dir_lists_nothing() {
        let fonts = available_fonts(Path::new("definitely/not/here")).expect("list");
        assert!(fonts.is_empty());
    }

    #[test]
    fn broken_font_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.ttf"), b"not a font").expect("write");
        let err = resolve_font(dir.path(), Some("broken.ttf"), None, &[]).unwrap_err();
        assert!(err.to_string().contains("failed to parse font"));
    }

    #[test]
    fn estimate_grows_with_size() {
        let small = EstimatedMetrics.measure("Hello", 10.0);
        let large = EstimatedMetrics.measure("Hello", 20.0);
        assert!(large.width > small.width);
        assert!((large.height - 24.0).abs() < 1e-3);
    }
}
