use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

use crate::detection::morphology::{close_rect, dilate_rect, open_rect};
use crate::error::StageError;
use crate::models::{PreprocessedVariant, RasterImage, VariantKind};

/// Smallest side any enhancement transform accepts.
pub const MIN_VARIANT_SIDE: u32 = 3;

/// Sigma of a 3x3 Gaussian kernel when sigma is derived from the kernel size.
const BLUR_3X3_SIGMA: f32 = 0.8;

const ADAPTIVE_BLOCK_SIZE: u32 = 11;
const ADAPTIVE_OFFSET: f32 = 2.0;

const CLAHE_TILES: u32 = 8;
const CLAHE_CLIP_LIMIT: f32 = 2.0;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// All variants produced for one run, keyed by transform.
#[derive(Debug, Clone, Default)]
pub struct VariantSet {
    variants: BTreeMap<VariantKind, PreprocessedVariant>,
    degraded: Vec<(VariantKind, StageError)>,
}

impl VariantSet {
    pub fn get(&self, kind: VariantKind) -> Option<&PreprocessedVariant> {
        self.variants.get(&kind)
    }

    pub fn contains(&self, kind: VariantKind) -> bool {
        self.variants.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<VariantKind> {
        self.variants.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreprocessedVariant> {
        self.variants.values()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Transforms that could not run, with the reason
    pub fn degraded(&self) -> &[(VariantKind, StageError)] {
        &self.degraded
    }

    fn insert(&mut self, kind: VariantKind, result: Result<GrayImage, StageError>) {
        match result {
            Ok(image) => {
                self.variants.insert(kind, PreprocessedVariant { kind, image });
            }
            Err(err) => {
                log::warn!("Preprocessing variant `{}` lost: {}", kind, err);
                self.degraded.push((kind, err));
            }
        }
    }
}

/// Build every preprocessing variant of `image`. Never fails: a transform
/// that cannot run is left out, and `gray` is always present.
pub fn preprocess(image: &RasterImage) -> VariantSet {
    let gray = to_grayscale(image);
    let mut set = VariantSet::default();

    set.insert(VariantKind::Standard, standard(&gray));
    set.insert(VariantKind::Adaptive, adaptive(&gray));
    set.insert(VariantKind::Enhanced, enhanced(&gray));
    set.insert(VariantKind::Edges, edges(&gray));
    set.insert(VariantKind::Gray, Ok(gray));

    log::debug!("Preprocessed {} variants: {:?}", set.len(), set.kinds());
    set
}

/// Convert image to grayscale
pub fn to_grayscale(img: &RasterImage) -> GrayImage {
    img.to_gray()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Binary threshold at the Otsu level: bright pixels become 255.
pub fn otsu_binarize(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    threshold(img, level, ThresholdType::Binary)
}

/// Swap foreground and background of a mask
pub fn invert(img: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    image::imageops::invert(&mut out);
    out
}

fn ensure_min_side(stage: &'static str, img: &GrayImage) -> Result<(), StageError> {
    let (width, height) = img.dimensions();
    if width < MIN_VARIANT_SIDE || height < MIN_VARIANT_SIDE {
        return Err(StageError::TooSmall {
            stage,
            width,
            height,
            min: MIN_VARIANT_SIDE,
        });
    }
    Ok(())
}

/// Blur, Otsu threshold, then 2x2 close and open to drop speckle.
fn standard(gray: &GrayImage) -> Result<GrayImage, StageError> {
    ensure_min_side("standard", gray)?;
    let blurred = apply_blur(gray, BLUR_3X3_SIGMA);
    let binary = otsu_binarize(&blurred);
    Ok(clean_speckle(&binary))
}

fn adaptive(gray: &GrayImage) -> Result<GrayImage, StageError> {
    ensure_min_side("adaptive", gray)?;
    Ok(adaptive_gaussian_threshold(gray, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET))
}

/// CLAHE and sharpening ahead of the Otsu threshold and speckle cleanup.
fn enhanced(gray: &GrayImage) -> Result<GrayImage, StageError> {
    ensure_min_side("enhanced", gray)?;
    let equalized = clahe(gray, CLAHE_TILES, CLAHE_CLIP_LIMIT);
    let sharpened = sharpen(&equalized);
    let binary = otsu_binarize(&sharpened);
    Ok(clean_speckle(&binary))
}

fn edges(gray: &GrayImage) -> Result<GrayImage, StageError> {
    ensure_min_side("edges", gray)?;
    let edges = detect_edges(gray, CANNY_LOW, CANNY_HIGH);
    Ok(dilate_rect(&edges, 2, 2))
}

fn clean_speckle(binary: &GrayImage) -> GrayImage {
    let closed = close_rect(binary, 2, 2);
    open_rect(&closed, 2, 2)
}

/// Threshold each pixel against a Gaussian-weighted mean of its
/// `block_size` neighbourhood minus `offset`.
pub fn adaptive_gaussian_threshold(img: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    // Sigma a Gaussian kernel of this size would use when none is given
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(img, sigma.max(0.1));

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y)[0] as f32;
        let limit = local_mean.get_pixel(x, y)[0] as f32 - offset;
        if value > limit { Luma([255]) } else { Luma([0]) }
    })
}

/// Contrast-limited adaptive histogram equalisation over a `tiles`x`tiles`
/// grid with bilinear blending between tile lookup tables.
pub fn clahe(img: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let tiles = tiles.max(1);
    let tile_w = width.div_ceil(tiles).max(1);
    let tile_h = height.div_ceil(tiles).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts[(ty * tiles_x + tx) as usize] = clipped_equalization(&mut hist, area, clip_limit);
        }
    }

    let lut_at = |tx: u32, ty: u32, v: u8| luts[(ty * tiles_x + tx) as usize][v as usize] as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let v = img.get_pixel(x, y)[0];

        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = lut_at(tx0, ty0, v) * (1.0 - ax) + lut_at(tx1, ty0, v) * ax;
        let bottom = lut_at(tx0, ty1, v) * (1.0 - ax) + lut_at(tx1, ty1, v) * ax;
        let blended = top * (1.0 - ay) + bottom * ay;
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_equalization(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// 3x3 sharpening: centre weight 9, all eight neighbours -1.
/// Border pixels reuse the nearest in-image neighbour.
pub fn sharpen(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let at = |x: i64, y: i64| {
        let cx = x.clamp(0, width as i64 - 1) as u32;
        let cy = y.clamp(0, height as i64 - 1) as u32;
        img.get_pixel(cx, cy)[0] as i32
    };

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut neighbours = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 {
                    neighbours += at(x + dx, y + dy);
                }
            }
        }
        let value = 9 * at(x, y) - neighbours;
        Luma([value.clamp(0, 255) as u8])
    })
}
