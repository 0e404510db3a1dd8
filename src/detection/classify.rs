use image::GrayImage;
use imageproc::contrast::{threshold, ThresholdType};

use crate::detection::features::{region_confidence, DigitFeatures};
use crate::detection::templates::{best_match, fit_to_canvas, BINARY_LEVEL};
use crate::error::StageError;
use crate::models::{Candidate, CandidateRegion, Classification, ClassifierMethod};

/// Predicts the digit inside a candidate region: template correlation
/// first, feature rules when no template clears the score floor.
#[derive(Debug, Clone, Copy)]
pub struct RegionClassifier {
    min_template_score: f32,
}

impl RegionClassifier {
    pub fn new(min_template_score: f32) -> Self {
        Self { min_template_score }
    }

    pub fn classify(&self, region: &CandidateRegion) -> Classification {
        let canvas = match normalize(&region.roi) {
            Ok(canvas) => canvas,
            Err(err) => {
                log::debug!("Classifier skipped region at {:?}: {}", region.bbox, err);
                return Classification::none(ClassifierMethod::TemplateMatch);
            }
        };

        let (digit, method) = match best_match(&canvas, self.min_template_score) {
            Some(m) => {
                log::debug!(
                    "Template match {} (score {:.3}) at x={}",
                    m.digit,
                    m.score,
                    region.bbox.x
                );
                (Some(m.digit), ClassifierMethod::TemplateMatch)
            }
            None => match DigitFeatures::extract(&canvas, region.bbox.aspect_ratio()) {
                Ok(features) => (features.decide(), ClassifierMethod::FeatureHeuristic),
                Err(err) => {
                    log::warn!("Feature analysis lost for region at {:?}: {}", region.bbox, err);
                    (None, ClassifierMethod::FeatureHeuristic)
                }
            },
        };

        match digit {
            Some(digit) => Classification {
                digit: Some(digit),
                confidence: region_confidence(&region.roi),
                method,
            },
            None => Classification::none(method),
        }
    }

    /// Classify and attach the result to the region's position.
    /// Regions without a prediction produce no candidate.
    pub fn candidate(&self, region: &CandidateRegion) -> Option<Candidate> {
        let classification = self.classify(region);
        let digit = classification.digit?;
        Some(Candidate {
            bbox: region.bbox,
            digit,
            confidence: classification.confidence,
            method: classification.method,
            detector: region.detector,
            variant: region.variant,
        })
    }
}

impl Default for RegionClassifier {
    fn default() -> Self {
        Self::new(0.3)
    }
}

/// Binarise and fit the foreground onto the template canvas, so a glyph
/// compares the same at any size or offset inside its region.
pub fn normalize(roi: &GrayImage) -> Result<GrayImage, StageError> {
    if roi.width() == 0 || roi.height() == 0 {
        return Err(StageError::EmptyRegion);
    }
    let binary = threshold(roi, BINARY_LEVEL, ThresholdType::Binary);
    fit_to_canvas(&binary).ok_or(StageError::NoForeground)
}
