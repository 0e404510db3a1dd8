mod fixtures;
pub use fixtures::*;

// Re-export commonly used types for tests
pub use roulette_digits::detection::{build_sequence, group_numbers, Fuser};
pub use roulette_digits::{
    AreaRegime, BoundingBox, Candidate, ClassifierMethod, DetectorKind, FusedNumber, PipelineConfig,
    RasterImage, ReadingOrder, RecognitionPipeline, RecognizeError, VariantKind,
};
