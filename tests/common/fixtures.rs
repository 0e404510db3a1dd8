use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use roulette_digits::detection::templates::templates;
use roulette_digits::{
    BoundingBox, Candidate, ClassifierMethod, DetectorKind, FusedNumber, RasterImage, VariantKind,
};

/// Uniform RGB raster with no foreground at all.
pub fn blank_raster(width: u32, height: u32) -> RasterImage {
    let img = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    RasterImage::from(image::DynamicImage::ImageRgb8(img))
}

/// White digit glyphs on black. Each is the reference mask drawn at twice
/// its size, so strokes are about 4px wide and a glyph about 48px tall.
/// The glyph's leftmost foreground column lands at the given x.
pub fn glyph_raster(digits: &[(u8, u32)]) -> RasterImage {
    let mut canvas = GrayImage::new(260, 100);
    for &(digit, x) in digits {
        let Some(template) = templates().iter().find(|t| t.digit == digit) else {
            continue;
        };
        let glyph = imageops::resize(&template.mask, 56, 56, FilterType::Nearest);
        let left = glyph
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(gx, _, _)| gx)
            .min()
            .unwrap_or(0);
        imageops::overlay(&mut canvas, &glyph, x as i64 - left as i64, 22);
    }
    RasterImage::from(canvas)
}

/// Solid bright bar, the simplest glyph-like blob
pub fn bar_raster() -> RasterImage {
    let mut canvas = GrayImage::new(120, 60);
    for y in 15..43 {
        for x in 50..58 {
            canvas.put_pixel(x, y, Luma([255]));
        }
    }
    RasterImage::from(canvas)
}

pub fn make_candidate(x: u32, digit: u8, confidence: f32, method: ClassifierMethod) -> Candidate {
    Candidate {
        bbox: BoundingBox::new(x, 20, 12, 20),
        digit,
        confidence,
        method,
        detector: DetectorKind::Contour,
        variant: VariantKind::Standard,
    }
}

pub fn make_number(value: u32, x: u32) -> FusedNumber {
    FusedNumber {
        value,
        confidence: 60.0,
        x,
    }
}
