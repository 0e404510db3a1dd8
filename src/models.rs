use image::{DynamicImage, GrayImage, ImageBuffer};
use serde::Serialize;

use crate::error::InvalidInput;

/// Captured screen region handed in by the caller. Never mutated; every
/// preprocessing step derives a new raster from it.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    /// Build a raster from tightly packed 8-bit rows with 1, 3 or 4 channels.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, InvalidInput> {
        if width == 0 || height == 0 {
            return Err(InvalidInput::ZeroSize { width, height });
        }

        if !matches!(channels, 1 | 3 | 4) {
            return Err(InvalidInput::UnsupportedChannels { channels });
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(InvalidInput::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let actual = data.len();
        let image = match channels {
            1 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            3 => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            _ => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        }
        .ok_or(InvalidInput::BufferSize { expected, actual })?;

        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Check the raster is something the pipeline can work on.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.width() == 0 || self.height() == 0 {
            return Err(InvalidInput::ZeroSize {
                width: self.width(),
                height: self.height(),
            });
        }
        match self.channels() {
            1 | 3 | 4 => Ok(()),
            channels => Err(InvalidInput::UnsupportedChannels { channels }),
        }
    }

    /// Luminance view of the raster
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl From<GrayImage> for RasterImage {
    fn from(image: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(image),
        }
    }
}

/// Which deterministic transform produced a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Gray,
    Standard,
    Adaptive,
    Enhanced,
    Edges,
}

impl VariantKind {
    pub const ALL: [VariantKind; 5] = [
        VariantKind::Gray,
        VariantKind::Standard,
        VariantKind::Adaptive,
        VariantKind::Enhanced,
        VariantKind::Edges,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VariantKind::Gray => "gray",
            VariantKind::Standard => "standard",
            VariantKind::Adaptive => "adaptive",
            VariantKind::Enhanced => "enhanced",
            VariantKind::Edges => "edges",
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A raster derived from the input by one transform, tagged for provenance.
#[derive(Debug, Clone)]
pub struct PreprocessedVariant {
    pub kind: VariantKind,
    pub image: GrayImage,
}

/// Axis-aligned box in input pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// One past the right-most column
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Rows shared with `other`
    pub fn vertical_overlap(&self, other: &BoundingBox) -> u32 {
        let top = self.y.max(other.y);
        let bottom = self.bottom().min(other.bottom());
        bottom.saturating_sub(top)
    }
}

/// Which detector strategy proposed a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Contour,
    Edge,
    AdaptiveThreshold,
    Morphology,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::Contour,
        DetectorKind::Edge,
        DetectorKind::AdaptiveThreshold,
        DetectorKind::Morphology,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::Contour => "contour",
            DetectorKind::Edge => "edge",
            DetectorKind::AdaptiveThreshold => "adaptive_threshold",
            DetectorKind::Morphology => "morphology",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A box believed to hold one glyph, plus the pixels inside it.
#[derive(Debug, Clone)]
pub struct CandidateRegion {
    pub bbox: BoundingBox,
    pub variant: VariantKind,
    pub detector: DetectorKind,
    /// Sub-raster of the scanned mask at `bbox`.
    pub roi: GrayImage,
}

/// Classification strategy. Declaration order is priority order: a template
/// match outranks a feature-rule guess at equal confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMethod {
    TemplateMatch,
    FeatureHeuristic,
}

impl ClassifierMethod {
    /// Higher wins ties
    pub fn priority(&self) -> u8 {
        match self {
            ClassifierMethod::TemplateMatch => 2,
            ClassifierMethod::FeatureHeuristic => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierMethod::TemplateMatch => "template_match",
            ClassifierMethod::FeatureHeuristic => "feature_heuristic",
        }
    }
}

impl std::fmt::Display for ClassifierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub digit: Option<u8>,
    /// 0 for an empty prediction, otherwise within [10, 100].
    pub confidence: f32,
    pub method: ClassifierMethod,
}

impl Classification {
    pub fn none(method: ClassifierMethod) -> Self {
        Self {
            digit: None,
            confidence: 0.0,
            method,
        }
    }
}

/// One detector + classifier proposal for a glyph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub digit: u8,
    pub confidence: f32,
    pub method: ClassifierMethod,
    pub detector: DetectorKind,
    pub variant: VariantKind,
}

impl Candidate {
    pub fn x(&self) -> u32 {
        self.bbox.x
    }

    /// Provenance label, e.g. `contour/standard/template_match`
    pub fn source_method(&self) -> String {
        format!("{}/{}/{}", self.detector, self.variant, self.method)
    }
}

/// A whole printed number assembled from one or more fused candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusedNumber {
    pub value: u32,
    pub confidence: f32,
    pub x: u32,
}

/// Final ordered values, each within [0, 36].
pub type ResultSequence = Vec<u8>;
