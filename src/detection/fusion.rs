use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::Candidate;

/// Collapses redundant proposals into one candidate per horizontal bucket.
#[derive(Debug, Clone, Copy)]
pub struct Fuser {
    bucket_width: u32,
    min_confidence: f32,
}

impl Fuser {
    pub fn new(bucket_width: u32) -> Self {
        Self {
            bucket_width: bucket_width.max(1),
            min_confidence: 0.0,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn bucket_width(&self) -> u32 {
        self.bucket_width
    }

    pub fn bucket_of(&self, candidate: &Candidate) -> u32 {
        candidate.x() / self.bucket_width
    }

    /// Keep the best candidate of each bucket, ordered left to right.
    /// The result does not depend on the order of `candidates`.
    pub fn fuse(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut buckets: BTreeMap<u32, &Candidate> = BTreeMap::new();

        for candidate in candidates {
            if candidate.digit > 9 || candidate.confidence <= 0.0 {
                continue;
            }
            if candidate.confidence < self.min_confidence {
                log::debug!(
                    "Dropping {} at x={} (confidence {:.1} below {:.1})",
                    candidate.digit,
                    candidate.x(),
                    candidate.confidence,
                    self.min_confidence
                );
                continue;
            }

            buckets
                .entry(self.bucket_of(candidate))
                .and_modify(|kept| {
                    if rank(candidate, kept) == Ordering::Greater {
                        *kept = candidate;
                    }
                })
                .or_insert(candidate);
        }

        let mut fused: Vec<Candidate> = buckets.into_values().cloned().collect();
        fused.sort_by_key(|c| c.x());
        fused
    }
}

/// Total order over candidates competing for one bucket; `Greater` wins.
/// Confidence first, then classifier method, then the left-most box. The
/// remaining keys only make the choice independent of input order.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then(a.method.priority().cmp(&b.method.priority()))
        .then(b.x().cmp(&a.x()))
        .then(b.digit.cmp(&a.digit))
        .then(b.detector.cmp(&a.detector))
        .then(b.variant.cmp(&a.variant))
        .then(b.bbox.y.cmp(&a.bbox.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, ClassifierMethod, DetectorKind, VariantKind};

    fn candidate(x: u32, digit: u8, confidence: f32, method: ClassifierMethod) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(x, 10, 12, 20),
            digit,
            confidence,
            method,
            detector: DetectorKind::Contour,
            variant: VariantKind::Standard,
        }
    }

    #[test]
    fn highest_confidence_wins_bucket() {
        let fuser = Fuser::new(30);
        let fused = fuser.fuse(&[
            candidate(12, 1, 35.0, ClassifierMethod::FeatureHeuristic),
            candidate(10, 7, 80.0, ClassifierMethod::TemplateMatch),
            candidate(15, 4, 60.0, ClassifierMethod::TemplateMatch),
        ]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].digit, 7);
    }

    #[test]
    fn ties_prefer_template_then_left_most() {
        let fuser = Fuser::new(30);
        let fused = fuser.fuse(&[
            candidate(5, 2, 50.0, ClassifierMethod::FeatureHeuristic),
            candidate(20, 3, 50.0, ClassifierMethod::TemplateMatch),
        ]);
        assert_eq!(fused[0].digit, 3);

        let fused = fuser.fuse(&[
            candidate(20, 3, 50.0, ClassifierMethod::TemplateMatch),
            candidate(8, 9, 50.0, ClassifierMethod::TemplateMatch),
        ]);
        assert_eq!(fused[0].digit, 9);
    }

    #[test]
    fn invalid_and_weak_candidates_are_dropped() {
        let fuser = Fuser::new(30).with_min_confidence(20.0);
        let fused = fuser.fuse(&[
            candidate(0, 12, 90.0, ClassifierMethod::TemplateMatch),
            candidate(40, 5, 0.0, ClassifierMethod::TemplateMatch),
            candidate(80, 6, 15.0, ClassifierMethod::TemplateMatch),
            candidate(120, 2, 25.0, ClassifierMethod::FeatureHeuristic),
        ]);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].digit, 2);
    }

    #[test]
    fn output_sorted_by_x() {
        let fuser = Fuser::new(30);
        let fused = fuser.fuse(&[
            candidate(95, 1, 50.0, ClassifierMethod::TemplateMatch),
            candidate(5, 2, 50.0, ClassifierMethod::TemplateMatch),
            candidate(40, 3, 50.0, ClassifierMethod::TemplateMatch),
        ]);
        let xs: Vec<u32> = fused.iter().map(Candidate::x).collect();
        assert_eq!(xs, vec![5, 40, 95]);
    }

    #[test]
    fn zero_bucket_width_is_clamped() {
        assert_eq!(Fuser::new(0).bucket_width(), 1);
    }
}
