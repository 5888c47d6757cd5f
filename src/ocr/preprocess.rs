use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

const MAX_SCALED_WIDTH: u32 = 6000;

/// Grayscale page, doubled in size when that stays under 6000px wide, with its
/// contrast stretched to the full range. Transparent pixels read as white paper.
pub(super) fn prepare_page(image: &DynamicImage, scale: u32) -> GrayImage {
    let rgba = image.to_rgba8();
    let gray = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |channel: u8| channel as f32 * alpha + 255.0 * (1.0 - alpha);
        let luma = 0.299 * over_white(r) + 0.587 * over_white(g) + 0.114 * over_white(b);
        Luma([luma.round() as u8])
    });

    let gray = if scale > 1 {
        imageops::resize(
            &gray,
            gray.width().saturating_mul(scale),
            gray.height().saturating_mul(scale),
            FilterType::Lanczos3,
        )
    } else {
        gray
    };
    stretch_contrast(gray)
}

pub(super) fn upscale_factor(width: u32) -> u32 {
    if width.saturating_mul(2) <= MAX_SCALED_WIDTH {
        2
    } else {
        1
    }
}

fn stretch_contrast(mut image: GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), pixel| {
            (min.min(pixel[0]), max.max(pixel[0]))
        });
    if max <= min {
        return image;
    }
    let factor = 255.0 / f32::from(max - min);
    for pixel in image.pixels_mut() {
        pixel[0] = (f32::from(pixel[0] - min) * factor).round() as u8;
    }
    image
}
