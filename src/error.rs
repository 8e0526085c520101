//! Error taxonomy for the capture-to-overlay pipeline.
//!
//! Each stage owns a narrow error enum. The capture session folds all of
//! them into [`PipelineError`] at its boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;

/// Failure to load or validate the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Error raised by the platform permission subsystem.
#[derive(Debug, Clone, Error)]
#[error("permission request failed: {0}")]
pub struct PermissionError(pub String);

/// Error raised by the camera while taking a picture.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    /// The camera has not been opened or was released.
    #[error("camera is not available")]
    Unavailable,
    /// The shutter fired but no image came back.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Failure to load the two-part model artifact.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The topology descriptor or one of its weight shards is missing.
    #[error("model artifact not found: {}", .0.display())]
    Missing(PathBuf),
    /// The descriptor could not be read from disk.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The descriptor is not valid JSON or lacks required fields.
    #[error("malformed model descriptor {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    /// The backend rejected the artifact.
    #[error("model backend failed to load: {0}")]
    Backend(String),
    /// A model was already loaded (or a load already failed) for this slot.
    #[error("model slot has already been initialized")]
    AlreadyLoaded,
}

/// Failure to turn an image resource into a tensor.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The resource contained no bytes.
    #[error("image resource is empty")]
    Empty,
    /// The resource bytes could not be read.
    #[error("failed to read image resource {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The bytes are not a decodable image.
    #[error("malformed image data: {0}")]
    Malformed(#[from] image::ImageError),
    /// The image decoded to a zero-sized grid.
    #[error("decoded image has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    /// The decoded pixel buffer did not match its declared shape.
    #[error("pixel buffer does not match shape {0:?}")]
    Shape(#[from] ndarray::ShapeError),
    /// The blocking decode worker panicked or was cancelled.
    #[error("decode worker failed: {0}")]
    Worker(String),
}

/// Failure while running inference.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The model handle reports itself as disposed or otherwise not usable.
    #[error("model handle is not ready for inference")]
    ModelUnavailable,
    /// Tensor shape differs from the shape the model declares.
    #[error("tensor shape {got:?} does not match model input shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },
    /// Converting the tensor into the backend's input format failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),
    /// The model call itself failed.
    #[error("model inference failed: {0}")]
    Backend(String),
}

/// Every way a capture cycle can end without publishing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Camera authorization is denied or still pending; capture is disabled.
    #[error("camera permission denied")]
    PermissionDenied,
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    /// A capture was attempted before the model finished loading.
    #[error("model not ready: {reason}")]
    ModelNotReady { reason: String },
    #[error(transparent)]
    Capture(#[from] CameraError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    /// A stage exceeded its bounded wait.
    #[error("{stage} stage timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
    /// Internal signal: a newer request superseded this one.
    #[error("result for request {sequence_id} discarded, superseded by request {current}")]
    StaleResultDiscarded { sequence_id: u64, current: u64 },
}
