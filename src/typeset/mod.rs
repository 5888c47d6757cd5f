mod font;
mod render;

use serde::Serialize;

use crate::region::RegionRect;

pub use font::{EstimatedMetrics, FontMetrics, ResolvedFont, available_fonts, load_font_metrics, resolve_font};
pub use render::{TextStyle, encode_image, rasterize_svg, render_page_svg, render_regions_svg};

pub const DEFAULT_MIN_FONT_SIZE: u32 = 10;
pub const DEFAULT_MAX_FONT_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
    /// Distance from the line top to the baseline.
    pub ascent: f32,
}

/// Measures a single line of text at a given font size, in pixels.
pub trait TextMeasure {
    fn measure(&self, text: &str, font_size: f32) -> TextExtent;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FontSizing {
    /// Largest size in `min..=max` whose wrapped block fits the region.
    Auto { min: u32, max: u32 },
    /// Wrap at exactly this size; the block may overflow vertically.
    Fixed(u32),
}

impl Default for FontSizing {
    fn default() -> Self {
        FontSizing::Auto {
            min: DEFAULT_MIN_FONT_SIZE,
            max: DEFAULT_MAX_FONT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub baseline: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub region: RegionRect,
    pub font_size: u32,
    pub lines: Vec<PlacedLine>,
    /// True when the block does not fit the region at the chosen size.
    pub overflow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub font_size: u32,
    pub lines: Vec<String>,
    pub fits: bool,
}

/// Greedy word wrap against `max_width`.
///
/// A word that is wider than `max_width` on its own is split between characters, so
/// every line is non-empty and the loop always advances.
pub fn wrap_text<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: f32,
    font_size: f32,
    measure: &M,
) -> Vec<String> {
    let fits = |candidate: &str| measure.measure(candidate, font_size).width <= max_width;
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if fits(&candidate) {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            if fits(word) {
                current = word.to_string();
                continue;
            }
        }
        current = split_word(word, &fits, &mut lines);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn split_word(word: &str, fits: &dyn Fn(&str) -> bool, lines: &mut Vec<String>) -> String {
    let mut piece = String::new();
    for ch in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(ch);
        if piece.is_empty() || fits(&candidate) {
            piece = candidate;
        } else {
            lines.push(std::mem::replace(&mut piece, ch.to_string()));
        }
    }
    piece
}

fn block_fits<M: TextMeasure + ?Sized>(
    lines: &[String],
    max_width: f32,
    max_height: f32,
    font_size: f32,
    measure: &M,
) -> bool {
    let mut total_height = 0.0;
    for line in lines {
        let extent = measure.measure(line, font_size);
        if extent.width > max_width {
            return false;
        }
        total_height += extent.height;
    }
    total_height <= max_height
}

/// Binary search for the largest font size whose wrapped block fits `max_width` x
/// `max_height`. Falls back to the minimum size's layout when nothing fits.
pub fn fit_text<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: f32,
    max_height: f32,
    min_size: u32,
    max_size: u32,
    measure: &M,
) -> FitResult {
    let min_size = min_size.max(1);
    let max_size = max_size.max(min_size);
    let mut best: Option<(u32, Vec<String>)> = None;
    let mut low = min_size;
    let mut high = max_size;

    while low <= high {
        let mid = low + (high - low) / 2;
        let lines = wrap_text(text, max_width, mid as f32, measure);
        if block_fits(&lines, max_width, max_height, mid as f32, measure) {
            best = Some((mid, lines));
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }

    match best {
        Some((font_size, lines)) => FitResult {
            font_size,
            lines,
            fits: true,
        },
        None => FitResult {
            font_size: min_size,
            lines: wrap_text(text, max_width, min_size as f32, measure),
            fits: false,
        },
    }
}

/// Chooses a size, wraps, and centers `text` inside `region`.
///
/// Returns `None` for blank text.
pub fn plan_region<M: TextMeasure + ?Sized>(
    text: &str,
    region: RegionRect,
    sizing: FontSizing,
    measure: &M,
) -> Option<RenderPlan> {
    if text.trim().is_empty() {
        return None;
    }
    let width = region.width() as f32;
    let height = region.height() as f32;

    let fit = match sizing {
        FontSizing::Auto { min, max } => fit_text(text, width, height, min, max, measure),
        FontSizing::Fixed(size) => {
            let size = size.max(1);
            let lines = wrap_text(text, width, size as f32, measure);
            let fits = block_fits(&lines, width, height, size as f32, measure);
            FitResult {
                font_size: size,
                lines,
                fits,
            }
        }
    };

    let font_size = fit.font_size as f32;
    let extents: Vec<TextExtent> = fit
        .lines
        .iter()
        .map(|line| measure.measure(line, font_size))
        .collect();
    let total_height: f32 = extents.iter().map(|extent| extent.height).sum();

    let mut y = region.min_y as f32 + (height - total_height) / 2.0;
    let mut lines = Vec::with_capacity(fit.lines.len());
    for (text, extent) in fit.lines.into_iter().zip(extents) {
        let x = region.min_x as f32 + (width - extent.width) / 2.0;
        lines.push(PlacedLine {
            text,
            x,
            y,
            baseline: y + extent.ascent,
            width: extent.width,
            height: extent.height,
        });
        y += extent.height;
    }

    Some(RenderPlan {
        region,
        font_size: fit.font_size,
        lines,
        overflow: !fit.fits,
    })
}
