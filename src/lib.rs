pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use config::{AreaRegime, PipelineConfig, ReadingOrder};
pub use error::{InvalidInput, RecognizeError, StageError};
pub use models::{
    BoundingBox, Candidate, ClassifierMethod, DetectorKind, FusedNumber, RasterImage,
    ResultSequence, VariantKind,
};
pub use pipeline::{recognize, Recognition, RecognitionPipeline, StageReport};
