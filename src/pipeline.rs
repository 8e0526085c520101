//! Capture, decode, inference, projection and publication stages.

mod engine;
mod projector;
mod rect;
mod session;
mod state;
mod tensor;

pub use engine::{Detection, DetectionEngine};
pub use projector::{AnnotationOverlay, ContentFit, OverlayProjector, format_label};
pub use rect::Rect;
pub use session::{CaptureOutcome, CaptureRequest, CaptureSession, bootstrap};
pub use state::{ModelStatus, PipelineState, SessionPhase, Stage};
pub use tensor::{CHANNELS, Dimensions, ImageTensor, TensorDecoder, decode_bytes};
