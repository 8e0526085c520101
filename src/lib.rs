//! Capture-to-overlay object detection pipeline.
//!
//! A single still frame is captured, decoded into a tensor, run through a
//! detection model and projected into viewport coordinates so a camera
//! preview can draw labelled boxes over the objects it sees.
//!
//! The camera, the OS permission prompt and the model runtime are external
//! collaborators reached through the traits in [`integration`]. The
//! [`CaptureSession`] ties the stages together and publishes the latest
//! [`AnnotationOverlay`] list into a shared [`PipelineState`].

pub mod config;
pub mod error;
pub mod integration;
pub mod pipeline;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{
    CameraError, ConfigError, DecodeError, InferenceError, ModelLoadError, PermissionError,
    PipelineError,
};
pub use integration::{
    BoxFormat, CameraSource, DetectionBuilder, DetectionModel, ImageResource, ModelBackend,
    ModelHandle, ModelLoader, ModelSlot, PermissionGate, PermissionProvider, PermissionStatus,
    RawDetection,
};
pub use pipeline::{
    AnnotationOverlay, CaptureOutcome, CaptureSession, ContentFit, Detection, DetectionEngine,
    Dimensions, ImageTensor, ModelStatus, OverlayProjector, PipelineState, Rect, SessionPhase,
    TensorDecoder, bootstrap,
};
