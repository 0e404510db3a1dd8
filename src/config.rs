use serde::{Deserialize, Serialize};

/// Geometric filter regime for the contour detector and default bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaRegime {
    Loose,
    #[default]
    Strict,
}

impl AreaRegime {
    pub fn default_bucket_width(&self) -> u32 {
        match self {
            AreaRegime::Loose => 50,
            AreaRegime::Strict => 30,
        }
    }
}

/// Order of the final sequence. `RightToLeft` is used when the newest
/// number on the overlay is drawn on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOrder {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// Options recognised by the recognition pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub area_bounds_regime: AreaRegime,
    /// Width of the horizontal fusion bins. `None` uses the regime default.
    pub bucket_width_px: Option<u32>,
    /// Drop repeated values, keeping the first occurrence.
    pub unique_mode: bool,
    /// Minimum correlation a template match needs to be accepted.
    pub min_template_score: f32,
    /// Candidates below this confidence are dropped before fusion.
    pub min_classifier_confidence: f32,
    pub reading_order: ReadingOrder,
    /// Fold neighbouring digits closer than this gap into one two-digit number.
    pub digit_join_gap_px: Option<u32>,
    /// Run detector jobs on scoped worker threads.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            area_bounds_regime: AreaRegime::Strict,
            bucket_width_px: None,
            unique_mode: false,
            min_template_score: 0.3,
            min_classifier_confidence: 0.0,
            reading_order: ReadingOrder::LeftToRight,
            digit_join_gap_px: None,
            parallel: false,
        }
    }
}

impl PipelineConfig {
    pub fn bucket_width(&self) -> u32 {
        self.bucket_width_px
            .unwrap_or_else(|| self.area_bounds_regime.default_bucket_width())
            .max(1)
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_width_follows_regime_unless_overridden() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.bucket_width(), 30);

        config.area_bounds_regime = AreaRegime::Loose;
        assert_eq!(config.bucket_width(), 50);

        config.bucket_width_px = Some(42);
        assert_eq!(config.bucket_width(), 42);

        config.bucket_width_px = Some(0);
        assert_eq!(config.bucket_width(), 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "area_bounds_regime": "loose",
            "unique_mode": true,
            "reading_order": "right_to_left"
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();

        assert_eq!(config.area_bounds_regime, AreaRegime::Loose);
        assert!(config.unique_mode);
        assert_eq!(config.reading_order, ReadingOrder::RightToLeft);
        assert_eq!(config.min_template_score, 0.3);
        assert_eq!(config.bucket_width_px, None);
    }
}
