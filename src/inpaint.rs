use anyhow::{Result, anyhow};
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::morphology;
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;

use crate::geometry::Quad;

pub const DEFAULT_RADIUS: u32 = 3;
pub const DEFAULT_DILATION_ITERATIONS: u32 = 2;

const MASKED: Luma<u8> = Luma([255]);

/// Binary mask (255 = remove) of every polygon, grown by a 3x3 kernel
/// `dilation_iterations` times so glyph edges are covered.
pub fn build_mask(width: u32, height: u32, polygons: &[Quad], dilation_iterations: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for quad in polygons {
        fill_quad(&mut mask, quad);
    }
    for _ in 0..dilation_iterations {
        mask = morphology::dilate(&mask, Norm::LInf, 1);
    }
    mask
}

fn fill_quad(mask: &mut GrayImage, quad: &Quad) {
    let mut points: Vec<PixelPoint<i32>> = Vec::with_capacity(4);
    for point in quad.points() {
        let pixel = PixelPoint::new(point.x.round() as i32, point.y.round() as i32);
        if points.last() != Some(&pixel) {
            points.push(pixel);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    if points.len() >= 3 {
        draw_polygon_mut(mask, &points, MASKED);
        return;
    }
    // Collapsed outline: cover its bounding box instead.
    let rect = quad.bounding_rect();
    let x = rect.min_x.floor() as i32;
    let y = rect.min_y.floor() as i32;
    let w = (rect.max_x.ceil() as i32 - x).max(1) as u32;
    let h = (rect.max_y.ceil() as i32 - y).max(1) as u32;
    draw_filled_rect_mut(mask, Rect::at(x, y).of_size(w, h), MASKED);
}

/// Fills the masked (non-zero) pixels of an image.
pub trait Inpainter {
    fn inpaint(&self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage>;
}

/// Fills the hole from its border inward: every pass assigns each masked pixel that
/// sees known pixels within `radius` the inverse-distance weighted mean of them.
#[derive(Debug, Clone, Copy)]
pub struct DiffusionInpainter {
    pub radius: u32,
}

impl Default for DiffusionInpainter {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
        }
    }
}

impl Inpainter for DiffusionInpainter {
    fn inpaint(&self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        if image.dimensions() != mask.dimensions() {
            return Err(anyhow!(
                "mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                image.dimensions()
            ));
        }
        let (width, height) = image.dimensions();
        let radius = self.radius.max(1) as i64;
        let mut output = image.clone();
        let mut known: Vec<bool> = mask.pixels().map(|pixel| pixel.0[0] == 0).collect();
        let mut pending: Vec<(u32, u32)> = mask
            .enumerate_pixels()
            .filter(|(_, _, pixel)| pixel.0[0] != 0)
            .map(|(x, y, _)| (x, y))
            .collect();

        while !pending.is_empty() {
            let mut filled = Vec::new();
            let mut remaining = Vec::new();
            for &(x, y) in &pending {
                match weighted_mean(&output, &known, width, height, x, y, radius) {
                    Some(color) => filled.push((x, y, color)),
                    None => remaining.push((x, y)),
                }
            }
            if filled.is_empty() {
                // Nothing known anywhere near the hole (e.g. a fully masked image).
                break;
            }
            for (x, y, color) in filled {
                output.put_pixel(x, y, image::Rgb(color));
                known[(y * width + x) as usize] = true;
            }
            pending = remaining;
        }

        Ok(output)
    }
}

fn weighted_mean(
    image: &RgbImage,
    known: &[bool],
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    radius: i64,
) -> Option<[u8; 3]> {
    let mut sum = [0.0f64; 3];
    let mut total = 0.0f64;
    for dy in -radius..=radius {
        let ny = y as i64 + dy;
        if ny < 0 || ny >= height as i64 {
            continue;
        }
        for dx in -radius..=radius {
            let nx = x as i64 + dx;
            if nx < 0 || nx >= width as i64 || (dx == 0 && dy == 0) {
                continue;
            }
            if !known[(ny as u32 * width + nx as u32) as usize] {
                continue;
            }
            let weight = 1.0 / (dx * dx + dy * dy) as f64;
            let pixel = image.get_pixel(nx as u32, ny as u32);
            for channel in 0..3 {
                sum[channel] += pixel.0[channel] as f64 * weight;
            }
            total += weight;
        }
    }
    if total == 0.0 {
        return None;
    }
    Some(sum.map(|value| (value / total).round().clamp(0.0, 255.0) as u8))
}
