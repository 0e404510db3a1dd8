use std::path::PathBuf;

/// Conditions that make an input raster unusable. A run that hits one of
/// these produces no sequence at all.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("image has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("unsupported channel count {channels} (expected 1, 3 or 4)")]
    UnsupportedChannels { channels: u8 },
    #[error("raw buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Errors surfaced to the caller of the recognition pipeline.
#[derive(thiserror::Error, Debug)]
pub enum RecognizeError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),
    #[error("debug directory is not empty: {}", .0.display())]
    DebugDirNotEmpty(PathBuf),
    #[error("cannot prepare debug directory {}: {source}", path.display())]
    DebugDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecognizeError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RecognizeError::InvalidInput(_))
    }
}

/// A single preprocessing transform, detector job or classifier strategy
/// that could not contribute. Always recovered where it happens.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage} needs at least {min}x{min} pixels, got {width}x{height}")]
    TooSmall {
        stage: &'static str,
        width: u32,
        height: u32,
        min: u32,
    },
    #[error("{detector} detector has no `{variant}` variant to scan")]
    MissingVariant {
        detector: &'static str,
        variant: &'static str,
    },
    #[error("region of interest is empty")]
    EmptyRegion,
    #[error("region has no foreground pixels")]
    NoForeground,
}
