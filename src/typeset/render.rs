use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use super::RenderPlan;
use crate::region::RegionRect;

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub text_color: String,
    pub font_family: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            text_color: "#000000".to_string(),
            font_family: None,
        }
    }
}

/// Page image with every planned line drawn on top, as an SVG document.
pub fn render_page_svg(
    image_bytes: &[u8],
    image_mime: &str,
    width: u32,
    height: u32,
    plans: &[RenderPlan],
    style: &TextStyle,
) -> String {
    let mut svg = svg_header(image_bytes, image_mime, width, height);
    let family_attr = style
        .font_family
        .as_deref()
        .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
        .unwrap_or_default();

    for plan in plans {
        for line in &plan.lines {
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}"{family}>{text}</text>"#,
                x = line.x,
                y = line.baseline,
                size = plan.font_size,
                color = escape_xml(&style.text_color),
                family = family_attr,
                text = escape_xml(&line.text)
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Debug overlay outlining each consolidated region.
pub fn render_regions_svg(
    image_bytes: &[u8],
    image_mime: &str,
    width: u32,
    height: u32,
    regions: &[RegionRect],
) -> String {
    let mut svg = svg_header(image_bytes, image_mime, width, height);
    for region in regions {
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#00c853" stroke-width="2"/>"##,
            x = region.min_x,
            y = region.min_y,
            w = region.width(),
            h = region.height()
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn svg_header(image_bytes: &[u8], image_mime: &str, width: u32, height: u32) -> String {
    let data_uri = format!("data:{};base64,{}", image_mime, BASE64.encode(image_bytes));
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));
    svg
}

pub fn rasterize_svg(svg: &str, font_data: Option<&[u8]>) -> Result<RgbaImage> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

/// Encodes `image` in `format`. Formats without an alpha channel get RGB data.
pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    match format {
        ImageFormat::Jpeg | ImageFormat::Bmp => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut cursor, format),
        _ => image.write_to(&mut cursor, format),
    }
    .with_context(|| format!("failed to encode {:?} image", format))?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
