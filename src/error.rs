// src/error.rs
//
// Error taxonomy for the intake pipeline. Only `Input` and `VideoOpen` are
// ever surfaced to the caller as a request failure; every other kind is
// absorbed at frame, box, or lookup granularity and shows up only as a
// missing entry in the result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad upload: missing file, empty filename, missing brand/model.
    #[error("Bad request: {0}")]
    Input(String),

    /// The video container could not be opened for decoding. Fatal to the
    /// whole request.
    #[error("Failed to open video: {0}")]
    VideoOpen(String),

    /// A single sampled frame failed to decode. Recovered by skipping it.
    #[error("Frame {index} could not be decoded: {reason}")]
    FrameDecode { index: u64, reason: String },

    /// A detector or classifier capability failed on one frame.
    #[error("{stage} stage failed: {reason}")]
    Detection { stage: &'static str, reason: String },

    /// A detection box with impossible geometry.
    #[error("Invalid box geometry: {0}")]
    Geometry(String),

    /// The price catalog was unavailable. Degrades to empty pricing.
    #[error("Catalog lookup failed: {0}")]
    CatalogLookup(String),

    /// A frame could not be encoded for output. Recovered by skipping it.
    #[error("Frame encoding failed: {0}")]
    Encoding(String),
}

impl PipelineError {
    pub fn detection(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Detection {
            stage,
            reason: err.to_string(),
        }
    }
}
