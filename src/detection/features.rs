use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::laplacian_filter;
use imageproc::geometry::{arc_length, contour_area};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::Serialize;

use crate::detection::morphology::open_rect;
use crate::error::StageError;

/// Area, in pixels, of a comfortably sized glyph.
pub const EXPECTED_GLYPH_AREA: f32 = 1000.0;

/// Enclosed background blobs smaller than this are noise, not holes.
const MIN_HOLE_PIXELS: usize = 4;

/// Length of the line element used for stroke strength
const STROKE_KERNEL: u32 = 5;

const FAST_THRESHOLD: u8 = 60;
const MAX_CORNERS: usize = 10;
const MIN_CORNER_DISTANCE: f32 = 10.0;

/// Shape measurements of a binarised glyph canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DigitFeatures {
    /// Enclosed background regions
    pub holes: u32,
    /// Share of foreground surviving a horizontal line opening
    pub horizontal_strength: f32,
    /// Share of foreground surviving a vertical line opening
    pub vertical_strength: f32,
    /// Perimeter over the perimeter of a circle of equal area (1 = circle)
    pub circularity: f32,
    /// Foreground share of the canvas
    pub fill_ratio: f32,
    /// Share of foreground in the top third of rows
    pub top_heavy: f32,
    /// Share of foreground in the bottom third of rows
    pub bottom_heavy: f32,
    pub corners: u32,
    /// Width over height of the region before normalisation
    pub aspect_ratio: f32,
}

impl DigitFeatures {
    /// Measure a binary canvas (foreground 255). `aspect_ratio` comes from
    /// the region box since the canvas itself is square.
    pub fn extract(binary: &GrayImage, aspect_ratio: f32) -> Result<Self, StageError> {
        let (width, height) = binary.dimensions();
        if width == 0 || height == 0 {
            return Err(StageError::EmptyRegion);
        }
        let foreground = count_foreground(binary);
        if foreground == 0 {
            return Err(StageError::NoForeground);
        }

        let horizontal = count_foreground(&open_rect(binary, STROKE_KERNEL, 1));
        let vertical = count_foreground(&open_rect(binary, 1, STROKE_KERNEL));
        let (top_heavy, bottom_heavy) = row_profile(binary, foreground);

        Ok(Self {
            holes: count_holes(binary),
            horizontal_strength: horizontal as f32 / foreground as f32,
            vertical_strength: vertical as f32 / foreground as f32,
            circularity: circularity(binary),
            fill_ratio: foreground as f32 / (width * height) as f32,
            top_heavy,
            bottom_heavy,
            corners: count_corners(binary),
            aspect_ratio,
        })
    }

    /// Map features to a digit. Branches that cannot separate two
    /// plausible digits return `None` rather than guessing.
    pub fn decide(&self) -> Option<u8> {
        if self.holes >= 2 {
            return Some(8);
        }
        if self.holes == 1 {
            if self.fill_ratio > 0.4 || (self.circularity > 0.0 && self.circularity < 1.15) {
                return Some(0);
            }
            if self.top_heavy > 0.4 && self.top_heavy > self.bottom_heavy {
                return Some(9);
            }
            if self.bottom_heavy > 0.4 && self.bottom_heavy > self.top_heavy {
                return Some(6);
            }
            // 6 and 9 are indistinguishable here
            return None;
        }
        if self.aspect_ratio < 0.5 {
            return Some(1);
        }
        if self.vertical_strength > 0.7 && self.horizontal_strength < 0.3 {
            return Some(1);
        }
        if self.top_heavy > 0.6 {
            return Some(7);
        }
        if self.bottom_heavy > 0.6 && self.corners > 3 {
            return Some(2);
        }
        if self.fill_ratio < 0.2 && self.vertical_strength > self.horizontal_strength {
            return Some(1);
        }
        if self.corners > 4 {
            return if self.aspect_ratio > 0.7 { Some(4) } else { Some(2) };
        }
        None
    }
}

fn count_foreground(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p[0] > 127).count()
}

/// Background components that do not touch the canvas border.
pub fn count_holes(binary: &GrayImage) -> u32 {
    let (width, height) = binary.dimensions();
    let mut background = binary.clone();
    image::imageops::invert(&mut background);

    let labels = connected_components(&background, Connectivity::Four, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if max_label == 0 {
        return 0;
    }
    let mut sizes = vec![0usize; max_label + 1];
    let mut touches_border = vec![false; max_label + 1];
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        sizes[label] += 1;
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            touches_border[label] = true;
        }
    }

    (1..=max_label)
        .filter(|&l| !touches_border[l] && sizes[l] >= MIN_HOLE_PIXELS)
        .count() as u32
}

/// Circularity of the largest outer boundary; 0 when there is none.
pub fn circularity(binary: &GrayImage) -> f32 {
    let largest = find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| (contour_area(&c.points).abs(), c))
        .max_by(|a, b| a.0.total_cmp(&b.0));

    match largest {
        Some((area, contour)) if area > 0.0 => {
            let perimeter = arc_length(&contour.points, true);
            (perimeter / (2.0 * (std::f64::consts::PI * area).sqrt())) as f32
        }
        _ => 0.0,
    }
}

fn row_profile(binary: &GrayImage, foreground: usize) -> (f32, f32) {
    let height = binary.height();
    let third = height / 3;
    let mut top = 0usize;
    let mut bottom = 0usize;
    for (_, y, p) in binary.enumerate_pixels() {
        if p[0] <= 127 {
            continue;
        }
        if y < third {
            top += 1;
        } else if y >= height - third {
            bottom += 1;
        }
    }
    (top as f32 / foreground as f32, bottom as f32 / foreground as f32)
}

/// Strongest FAST corners at least `MIN_CORNER_DISTANCE` apart, capped.
pub fn count_corners(binary: &GrayImage) -> u32 {
    let mut corners = corners_fast9(binary, FAST_THRESHOLD);
    corners.sort_by(|a, b| b.score.total_cmp(&a.score).then((a.y, a.x).cmp(&(b.y, b.x))));

    let mut kept: Vec<Corner> = Vec::new();
    for corner in corners {
        if kept.len() == MAX_CORNERS {
            break;
        }
        let far_enough = kept.iter().all(|k| {
            let dx = k.x as f32 - corner.x as f32;
            let dy = k.y as f32 - corner.y as f32;
            (dx * dx + dy * dy).sqrt() >= MIN_CORNER_DISTANCE
        });
        if far_enough {
            kept.push(corner);
        }
    }
    kept.len() as u32
}

/// Variance of the Laplacian response; higher means crisper strokes.
pub fn laplacian_variance(roi: &GrayImage) -> f64 {
    if roi.is_empty() {
        return 0.0;
    }
    let response = laplacian_filter(roi);
    let n = (response.width() * response.height()) as f64;
    let mean = response.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    response
        .pixels()
        .map(|p| {
            let d = p[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Blend of sharpness and size suitability, clamped to [10, 100].
pub fn region_confidence(roi: &GrayImage) -> f32 {
    let clarity = (laplacian_variance(roi) / 10.0).min(100.0) as f32;
    let area = (roi.width() * roi.height()) as f32;
    let size = (area / EXPECTED_GLYPH_AREA * 100.0).min(100.0);
    ((clarity + size) / 2.0).clamp(10.0, 100.0)
}
