use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::contour_area;
use imageproc::point::Point;

use crate::config::AreaRegime;
use crate::detection::morphology::{close_3x3, open_close_3x3};
use crate::detection::preprocessing::{invert, otsu_binarize};
use crate::error::StageError;
use crate::models::{BoundingBox, CandidateRegion, DetectorKind, PreprocessedVariant, VariantKind};

/// Geometric limits a traced boundary must meet to count as a glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryFilter {
    /// Exclusive bounds on the enclosed contour area
    pub min_area: f64,
    pub max_area: f64,
    /// Inclusive bounds on width / height
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Exclusive lower bounds on the box size
    pub min_height: u32,
    pub min_width: u32,
    /// Contour area over box area must exceed this, when set
    pub min_solidity: Option<f64>,
    /// Reject boxes whose fill is implausible or whose middle is empty
    pub quality_check: bool,
}

impl GeometryFilter {
    pub fn accepts(&self, area: f64, bbox: &BoundingBox) -> bool {
        if area <= self.min_area || area >= self.max_area {
            return false;
        }
        let aspect = bbox.aspect_ratio();
        if aspect < self.min_aspect || aspect > self.max_aspect {
            return false;
        }
        if bbox.height <= self.min_height || bbox.width <= self.min_width {
            return false;
        }
        match self.min_solidity {
            Some(min) => area / bbox.area() as f64 > min,
            None => true,
        }
    }
}

/// Whether both the mask and its inverse are traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    AsIs,
    Both,
}

impl DetectorKind {
    /// Variants this strategy scans
    pub fn source_variants(&self) -> &'static [VariantKind] {
        match self {
            DetectorKind::Contour => &[VariantKind::Standard, VariantKind::Enhanced],
            DetectorKind::Edge => &[VariantKind::Edges],
            DetectorKind::AdaptiveThreshold => &[VariantKind::Adaptive],
            DetectorKind::Morphology => &[VariantKind::Gray],
        }
    }

    pub fn geometry(&self, regime: AreaRegime) -> GeometryFilter {
        match (self, regime) {
            (DetectorKind::Contour, AreaRegime::Loose) => GeometryFilter {
                min_area: 100.0,
                max_area: 2000.0,
                min_aspect: 0.2,
                max_aspect: 1.2,
                min_height: 10,
                min_width: 5,
                min_solidity: None,
                quality_check: false,
            },
            (DetectorKind::Contour, AreaRegime::Strict) => GeometryFilter {
                min_area: 100.0,
                max_area: 5000.0,
                min_aspect: 0.2,
                max_aspect: 1.0,
                min_height: 15,
                min_width: 8,
                min_solidity: Some(0.3),
                quality_check: true,
            },
            (DetectorKind::Edge, _) => GeometryFilter {
                min_area: 30.0,
                max_area: 1500.0,
                min_aspect: 0.2,
                max_aspect: 1.5,
                min_height: 8,
                min_width: 4,
                min_solidity: None,
                quality_check: false,
            },
            (DetectorKind::AdaptiveThreshold, _) => GeometryFilter {
                min_area: 40.0,
                max_area: 1800.0,
                min_aspect: 0.25,
                max_aspect: 1.3,
                min_height: 9,
                min_width: 4,
                min_solidity: None,
                quality_check: false,
            },
            (DetectorKind::Morphology, _) => GeometryFilter {
                min_area: 35.0,
                max_area: 1600.0,
                min_aspect: 0.3,
                max_aspect: 1.2,
                min_height: 8,
                min_width: 5,
                min_solidity: None,
                quality_check: false,
            },
        }
    }

    fn polarity(&self) -> Polarity {
        match self {
            DetectorKind::Contour => Polarity::Both,
            _ => Polarity::AsIs,
        }
    }

    /// Edge maps only hold outlines, so their regions are cut from the
    /// grayscale input instead of the mask.
    fn crops_gray(&self) -> bool {
        *self == DetectorKind::Edge
    }

    /// Turn the scanned variant into the mask whose boundaries get traced.
    fn prepare_mask(&self, variant: &GrayImage) -> GrayImage {
        match self {
            DetectorKind::Contour | DetectorKind::AdaptiveThreshold => variant.clone(),
            DetectorKind::Edge => close_3x3(variant),
            DetectorKind::Morphology => open_close_3x3(&otsu_binarize(variant)),
        }
    }
}

/// One detection strategy with its geometric policy resolved.
#[derive(Debug, Clone, Copy)]
pub struct RegionDetector {
    kind: DetectorKind,
    geometry: GeometryFilter,
}

impl RegionDetector {
    pub fn new(kind: DetectorKind, regime: AreaRegime) -> Self {
        Self {
            kind,
            geometry: kind.geometry(regime),
        }
    }

    /// Propose glyph-sized regions in `variant`. `gray` is the grayscale
    /// input the variants were derived from.
    pub fn detect(
        &self,
        variant: &PreprocessedVariant,
        gray: &GrayImage,
    ) -> Result<Vec<CandidateRegion>, StageError> {
        if !self.kind.source_variants().contains(&variant.kind) {
            return Err(StageError::MissingVariant {
                detector: self.kind.name(),
                variant: variant.kind.name(),
            });
        }
        let (width, height) = variant.image.dimensions();
        if width == 0 || height == 0 {
            return Err(StageError::EmptyRegion);
        }

        if self.kind.crops_gray() && gray.dimensions() != (width, height) {
            return Err(StageError::MissingVariant {
                detector: self.kind.name(),
                variant: VariantKind::Gray.name(),
            });
        }

        let mask = self.kind.prepare_mask(&variant.image);
        let pixels = if self.kind.crops_gray() { gray } else { &mask };
        let mut regions = self.trace(&mask, pixels, variant.kind);

        if self.kind.polarity() == Polarity::Both {
            let inverted = invert(&mask);
            regions.extend(self.trace(&inverted, &inverted, variant.kind));
        }

        log::debug!(
            "{} detector on `{}`: {} regions",
            self.kind,
            variant.kind,
            regions.len()
        );
        Ok(regions)
    }

    /// Outer borders not nested in any other border, cropped from `pixels`.
    fn trace(
        &self,
        mask: &GrayImage,
        pixels: &GrayImage,
        variant: VariantKind,
    ) -> Vec<CandidateRegion> {
        let mut regions = Vec::new();

        for contour in find_contours::<i32>(mask) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            let Some(bbox) = bounding_box(&contour.points) else {
                continue;
            };
            let area = contour_area(&contour.points).abs();
            if !self.geometry.accepts(area, &bbox) {
                continue;
            }

            let roi = image::imageops::crop_imm(pixels, bbox.x, bbox.y, bbox.width, bbox.height)
                .to_image();
            if self.geometry.quality_check && !is_digit_quality(&roi) {
                continue;
            }

            regions.push(CandidateRegion {
                bbox,
                variant,
                detector: self.kind,
                roi,
            });
        }

        regions
    }
}

/// Smallest box holding every point
pub fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if min_x < 0 || min_y < 0 {
        return None;
    }
    Some(BoundingBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Foreground density must be plausible for a glyph and the middle
/// quadrant must not be empty.
pub fn is_digit_quality(roi: &GrayImage) -> bool {
    let (width, height) = roi.dimensions();
    if width == 0 || height == 0 {
        return false;
    }

    let density = foreground_fraction(roi, 0, 0, width, height);
    if !(0.1..=0.9).contains(&density) {
        return false;
    }

    let (x0, y0) = (width / 4, height / 4);
    let (x1, y1) = (3 * width / 4, 3 * height / 4);
    if x1 > x0 && y1 > y0 && foreground_fraction(roi, x0, y0, x1, y1) < 0.05 {
        return false;
    }
    true
}

fn foreground_fraction(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
    let mut on = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            if img.get_pixel(x, y)[0] == 255 {
                on += 1;
            }
        }
    }
    on as f64 / ((x1 - x0) * (y1 - y0)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn variant(kind: VariantKind, image: GrayImage) -> PreprocessedVariant {
        PreprocessedVariant { kind, image }
    }

    fn flat_gray(value: u8) -> GrayImage {
        GrayImage::from_pixel(80, 50, Luma([value]))
    }

    /// White 16x24 "8"-like block glyph with a 4px stroke on black.
    fn hollow_glyph_mask() -> GrayImage {
        let mut img = GrayImage::new(80, 50);
        draw_filled_rect_mut(&mut img, Rect::at(20, 10).of_size(16, 24), Luma([255]));
        draw_filled_rect_mut(&mut img, Rect::at(24, 14).of_size(8, 16), Luma([0]));
        draw_filled_rect_mut(&mut img, Rect::at(24, 20).of_size(8, 4), Luma([255]));
        img
    }

    #[test]
    fn contour_detector_finds_glyph_box() {
        let detector = RegionDetector::new(DetectorKind::Contour, AreaRegime::Strict);
        let regions = detector
            .detect(&variant(VariantKind::Standard, hollow_glyph_mask()), &flat_gray(0))
            .unwrap();

        let glyph: Vec<_> = regions.iter().filter(|r| r.bbox.x == 20).collect();
        assert_eq!(glyph.len(), 1);
        assert_eq!(glyph[0].bbox, BoundingBox::new(20, 10, 16, 24));
        assert_eq!(glyph[0].roi.dimensions(), (16, 24));
        assert_eq!(glyph[0].detector, DetectorKind::Contour);
        assert_eq!(glyph[0].variant, VariantKind::Standard);
    }

    #[test]
    fn rejects_wrong_variant() {
        let detector = RegionDetector::new(DetectorKind::Edge, AreaRegime::Strict);
        let err = detector
            .detect(&variant(VariantKind::Adaptive, hollow_glyph_mask()), &flat_gray(0))
            .unwrap_err();
        assert!(matches!(err, StageError::MissingVariant { .. }));
    }

    #[test]
    fn blank_mask_yields_no_regions() {
        for kind in DetectorKind::ALL {
            let detector = RegionDetector::new(kind, AreaRegime::Loose);
            let source = kind.source_variants()[0];
            let regions = detector
                .detect(&variant(source, GrayImage::new(200, 120)), &GrayImage::new(200, 120))
                .unwrap();
            assert!(regions.is_empty(), "{kind} found regions in blank mask");
        }
    }

    #[test]
    fn strict_regime_rejects_wide_blob() {
        let mut img = GrayImage::new(80, 50);
        draw_filled_rect_mut(&mut img, Rect::at(10, 10).of_size(30, 20), Luma([255]));
        let loose = RegionDetector::new(DetectorKind::Contour, AreaRegime::Loose);
        let strict = RegionDetector::new(DetectorKind::Contour, AreaRegime::Strict);
        let source = variant(VariantKind::Standard, img);
        let gray = flat_gray(0);

        // 30x20 box: aspect 1.5 is outside both regimes
        assert!(loose.detect(&source, &gray).unwrap().iter().all(|r| r.bbox.x != 10));
        assert!(strict.detect(&source, &gray).unwrap().iter().all(|r| r.bbox.x != 10));
    }

    #[test]
    fn glyph_inside_a_frame_is_not_traced() {
        let mut img = GrayImage::new(80, 50);
        draw_filled_rect_mut(&mut img, Rect::at(2, 2).of_size(76, 46), Luma([255]));
        draw_filled_rect_mut(&mut img, Rect::at(4, 4).of_size(72, 42), Luma([0]));
        let glyph = hollow_glyph_mask();
        for (x, y, p) in glyph.enumerate_pixels() {
            if p[0] == 255 {
                img.put_pixel(x, y, *p);
            }
        }

        for kind in [DetectorKind::Contour, DetectorKind::AdaptiveThreshold] {
            let source = variant(kind.source_variants()[0], img.clone());
            let regions = RegionDetector::new(kind, AreaRegime::Loose)
                .detect(&source, &flat_gray(0))
                .unwrap();
            assert!(regions.iter().all(|r| r.bbox.x != 20), "{kind} traced a nested border");
        }
    }

    #[test]
    fn only_contour_detector_traces_inverse_polarity() {
        // Dark glyph on a bright mask
        let mask = invert(&hollow_glyph_mask());

        let contour = RegionDetector::new(DetectorKind::Contour, AreaRegime::Strict)
            .detect(&variant(VariantKind::Standard, mask.clone()), &flat_gray(0))
            .unwrap();
        assert_eq!(contour.len(), 1);
        assert_eq!(contour[0].bbox, BoundingBox::new(20, 10, 16, 24));
        assert_eq!(contour[0].roi.get_pixel(0, 0)[0], 255);

        let adaptive = RegionDetector::new(DetectorKind::AdaptiveThreshold, AreaRegime::Strict)
            .detect(&variant(VariantKind::Adaptive, mask), &flat_gray(0))
            .unwrap();
        assert!(adaptive.is_empty());
    }

    #[test]
    fn edge_regions_are_cut_from_gray() {
        let detector = RegionDetector::new(DetectorKind::Edge, AreaRegime::Strict);
        let regions = detector
            .detect(&variant(VariantKind::Edges, hollow_glyph_mask()), &flat_gray(77))
            .unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(20, 10, 16, 24));
        assert!(regions[0].roi.pixels().all(|p| p[0] == 77));

        let err = detector
            .detect(&variant(VariantKind::Edges, hollow_glyph_mask()), &GrayImage::new(10, 10))
            .unwrap_err();
        assert!(matches!(err, StageError::MissingVariant { .. }));
    }

    #[test]
    fn geometry_filter_bounds() {
        let filter = DetectorKind::Contour.geometry(AreaRegime::Loose);
        let bbox = BoundingBox::new(0, 0, 10, 20);
        assert!(filter.accepts(150.0, &bbox));
        assert!(!filter.accepts(100.0, &bbox));
        assert!(!filter.accepts(2000.0, &bbox));
        assert!(!filter.accepts(150.0, &BoundingBox::new(0, 0, 10, 10 /* height too small */)));
    }

    #[test]
    fn quality_check_requires_centre_mass() {
        let mut hollow = GrayImage::new(20, 20);
        draw_filled_rect_mut(&mut hollow, Rect::at(0, 0).of_size(20, 3), Luma([255]));
        draw_filled_rect_mut(&mut hollow, Rect::at(0, 17).of_size(20, 3), Luma([255]));
        assert!(!is_digit_quality(&hollow));

        let mut bar = hollow.clone();
        draw_filled_rect_mut(&mut bar, Rect::at(8, 0).of_size(4, 20), Luma([255]));
        assert!(is_digit_quality(&bar));
    }

    #[test]
    fn bounding_box_of_points() {
        let points = [Point::new(3, 4), Point::new(7, 2), Point::new(5, 9)];
        assert_eq!(bounding_box(&points), Some(BoundingBox::new(3, 2, 5, 8)));
        assert_eq!(bounding_box(&[]), None);
    }
}
