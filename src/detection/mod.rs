pub mod preprocessing;
pub mod morphology;
pub mod contours;
pub mod templates;
pub mod features;
pub mod classify;
pub mod fusion;
pub mod sequence;

pub use classify::RegionClassifier;
pub use contours::{GeometryFilter, RegionDetector};
pub use fusion::Fuser;
pub use preprocessing::{preprocess, VariantSet};
pub use sequence::{build_sequence, group_numbers};
