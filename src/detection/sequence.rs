use std::collections::HashSet;

use crate::models::{Candidate, FusedNumber, ResultSequence};

/// Highest value a result may take
pub const MAX_VALUE: u32 = 36;

impl From<&Candidate> for FusedNumber {
    fn from(candidate: &Candidate) -> Self {
        Self {
            value: candidate.digit as u32,
            confidence: candidate.confidence,
            x: candidate.x(),
        }
    }
}

/// Turn fused candidates into numbers.
///
/// Without a join gap every candidate is a whole value. With one, a digit
/// directly followed by another (gap at most `join_gap` pixels, vertical
/// overlap at least half the shorter box) forms a two-digit number whose
/// confidence is the lower of the pair.
pub fn group_numbers(fused: &[Candidate], join_gap: Option<u32>) -> Vec<FusedNumber> {
    let Some(gap) = join_gap else {
        return fused.iter().map(FusedNumber::from).collect();
    };

    let mut numbers = Vec::with_capacity(fused.len());
    let mut i = 0;
    while i < fused.len() {
        let left = &fused[i];
        if let Some(right) = fused.get(i + 1) {
            if belong_together(left, right, gap) {
                numbers.push(FusedNumber {
                    value: left.digit as u32 * 10 + right.digit as u32,
                    confidence: left.confidence.min(right.confidence),
                    x: left.x(),
                });
                i += 2;
                continue;
            }
        }
        numbers.push(FusedNumber::from(left));
        i += 1;
    }
    numbers
}

fn belong_together(left: &Candidate, right: &Candidate, gap: u32) -> bool {
    if right.bbox.x < left.bbox.x || right.bbox.x.saturating_sub(left.bbox.right()) > gap {
        return false;
    }
    let shorter = left.bbox.height.min(right.bbox.height);
    left.bbox.vertical_overlap(&right.bbox) * 2 >= shorter
}

/// Range-filter values to [0, 36] keeping order; in unique mode only the
/// first occurrence of each value survives.
pub fn build_sequence(numbers: &[FusedNumber], unique_mode: bool) -> ResultSequence {
    let mut seen = HashSet::new();
    numbers
        .iter()
        .filter(|n| {
            let keep = n.value <= MAX_VALUE;
            if !keep {
                log::debug!("Dropping out-of-range value {} at x={}", n.value, n.x);
            }
            keep
        })
        .map(|n| n.value as u8)
        .filter(|v| !unique_mode || seen.insert(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, ClassifierMethod, DetectorKind, VariantKind};

    fn number(value: u32, x: u32) -> FusedNumber {
        FusedNumber {
            value,
            confidence: 50.0,
            x,
        }
    }

    fn digit(x: u32, y: u32, digit: u8, confidence: f32) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(x, y, 12, 20),
            digit,
            confidence,
            method: ClassifierMethod::TemplateMatch,
            detector: DetectorKind::Contour,
            variant: VariantKind::Enhanced,
        }
    }

    #[test]
    fn range_filter_drops_large_values() {
        let numbers = [number(3, 0), number(41, 20), number(36, 40), number(37, 60)];
        let seq = build_sequence(&numbers, false);
        assert_eq!(seq, vec![3, 36]);
    }

    #[test]
    fn unique_mode_keeps_first_occurrence() {
        let numbers = [number(5, 0), number(5, 10), number(12, 20), number(5, 30)];
        assert_eq!(build_sequence(&numbers, true), vec![5, 12]);
        assert_eq!(build_sequence(&numbers, false), vec![5, 5, 12, 5]);
    }

    #[test]
    fn whole_values_without_join_gap() {
        let fused = [digit(10, 0, 1, 60.0), digit(24, 0, 5, 70.0)];
        let numbers = group_numbers(&fused, None);
        assert_eq!(numbers.iter().map(|n| n.value).collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn close_neighbours_join() {
        // 1 ends at x=22, 5 starts at x=24
        let fused = [digit(10, 0, 1, 60.0), digit(24, 2, 5, 70.0), digit(80, 0, 3, 90.0)];
        let numbers = group_numbers(&fused, Some(4));
        assert_eq!(
            numbers,
            vec![
                FusedNumber { value: 15, confidence: 60.0, x: 10 },
                FusedNumber { value: 3, confidence: 90.0, x: 80 },
            ]
        );
    }

    #[test]
    fn misaligned_neighbours_stay_apart() {
        let fused = [digit(10, 0, 1, 60.0), digit(24, 15, 5, 70.0)];
        let numbers = group_numbers(&fused, Some(4));
        assert_eq!(numbers.len(), 2);

        let far = [digit(10, 0, 2, 60.0), digit(40, 0, 4, 70.0)];
        assert_eq!(group_numbers(&far, Some(4)).len(), 2);
    }
}
