//! Reference glyph masks for digits 0-9 and zero-mean normalized
//! cross-correlation against them.
//!
//! The masks live in `assets/digit_templates.txt` as 28x28 character grids
//! and are parsed once on first use.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use once_cell::sync::Lazy;

/// Side of the square canvas every region is normalised to.
pub const CANVAS_SIZE: u32 = 28;

/// Border left empty around a fitted glyph
const CANVAS_MARGIN: u32 = 2;

/// Pixels above this level are foreground.
pub const BINARY_LEVEL: u8 = 127;

const TEMPLATE_SOURCE: &str = include_str!("../../assets/digit_templates.txt");

static TEMPLATES: Lazy<Vec<DigitTemplate>> = Lazy::new(|| {
    parse_templates(TEMPLATE_SOURCE)
        .into_iter()
        .map(|t| DigitTemplate {
            digit: t.digit,
            mask: fit_to_canvas(&t.mask).unwrap_or(t.mask),
        })
        .collect()
});

#[derive(Debug, Clone)]
pub struct DigitTemplate {
    pub digit: u8,
    pub mask: GrayImage,
}

/// Best-scoring template for a canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub digit: u8,
    pub score: f32,
}

pub fn templates() -> &'static [DigitTemplate] {
    &TEMPLATES
}

/// Parse `digit N` blocks of `CANVAS_SIZE` rows made of `#` and `.`.
/// Lines starting with `;` are comments.
/// Malformed blocks are skipped with a warning.
pub fn parse_templates(source: &str) -> Vec<DigitTemplate> {
    let mut out = Vec::new();
    let mut lines = source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'));

    while let Some(header) = lines.next() {
        let Some(digit) = header
            .strip_prefix("digit ")
            .and_then(|d| d.trim().parse::<u8>().ok())
            .filter(|d| *d <= 9)
        else {
            log::warn!("Skipping unexpected template line: {header:?}");
            continue;
        };

        let rows: Vec<&str> = lines.by_ref().take(CANVAS_SIZE as usize).collect();
        let row_ok = |r: &&str| {
            r.len() == CANVAS_SIZE as usize && r.chars().all(|c| c == '#' || c == '.')
        };
        let well_formed = rows.len() == CANVAS_SIZE as usize && rows.iter().all(row_ok);
        if !well_formed {
            log::warn!("Template for digit {digit} is malformed, skipping");
            continue;
        }

        let mut mask = GrayImage::new(CANVAS_SIZE, CANVAS_SIZE);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
        out.push(DigitTemplate { digit, mask });
    }

    out
}

/// Crop to the foreground and scale it, aspect kept, into the centre of a
/// `CANVAS_SIZE` canvas. `None` when nothing is above `BINARY_LEVEL`.
pub fn fit_to_canvas(img: &GrayImage) -> Option<GrayImage> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p[0] <= BINARY_LEVEL {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    let (width, height) = (x1 - x0 + 1, y1 - y0 + 1);
    let glyph = imageops::crop_imm(img, x0, y0, width, height).to_image();

    let inner = CANVAS_SIZE - 2 * CANVAS_MARGIN;
    let scale = inner as f32 / width.max(height) as f32;
    let fit_w = ((width as f32 * scale).round() as u32).clamp(1, inner);
    let fit_h = ((height as f32 * scale).round() as u32).clamp(1, inner);
    let scaled = if (fit_w, fit_h) == (width, height) {
        glyph
    } else {
        imageops::resize(&glyph, fit_w, fit_h, FilterType::Triangle)
    };

    let mut canvas = GrayImage::new(CANVAS_SIZE, CANVAS_SIZE);
    let left = ((CANVAS_SIZE - fit_w) / 2) as i64;
    let top = ((CANVAS_SIZE - fit_h) / 2) as i64;
    imageops::replace(&mut canvas, &scaled, left, top);
    Some(threshold(&canvas, BINARY_LEVEL, ThresholdType::Binary))
}

/// Zero-mean normalized cross-correlation of two equally sized rasters.
/// Returns 0 when either raster is flat.
pub fn correlation(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.dimensions() != b.dimensions() || a.is_empty() {
        return 0.0;
    }

    let n = (a.width() * a.height()) as f64;
    let mean_a = a.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let mean_b = b.pixels().map(|p| p[0] as f64).sum::<f64>() / n;

    let (mut cross, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        let da = pa[0] as f64 - mean_a;
        let db = pb[0] as f64 - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (cross / denom) as f32
}

/// Highest-correlating digit, if its score exceeds `min_score`.
/// Equal scores keep the lower digit.
pub fn best_match(canvas: &GrayImage, min_score: f32) -> Option<TemplateMatch> {
    let mut best: Option<TemplateMatch> = None;
    for template in templates() {
        let score = correlation(canvas, &template.mask);
        if score <= min_score {
            continue;
        }
        if best.is_none_or(|b| score > b.score) {
            best = Some(TemplateMatch {
                digit: template.digit,
                score,
            });
        }
    }
    best
}
