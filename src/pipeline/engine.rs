//! Detection engine: runs the model and normalizes its raw output.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::integration::{DetectionBuilder, DetectionModel, ModelHandle, RawDetection};
use crate::pipeline::rect::Rect;
use crate::pipeline::tensor::{Dimensions, ImageTensor};

/// One recognized object, boxed in source image pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// Class label
    pub class: String,
    /// Confidence in `[0, 1]`
    pub score: f32,
    /// Bounding box (TLWH) in source image pixels
    pub bbox: Rect,
}

impl Detection {
    pub fn new(class: impl Into<String>, score: f32, bbox: Rect) -> Self {
        Self {
            class: class.into(),
            score,
            bbox,
        }
    }
}

/// Geometry needed to map tensor-space boxes back to the source image.
#[derive(Debug, Clone, Copy)]
struct TensorGeometry {
    tensor: Dimensions,
    source: Dimensions,
    scale: (f32, f32),
}

impl TensorGeometry {
    fn of(tensor: &ImageTensor) -> Self {
        Self {
            tensor: tensor.dims(),
            source: tensor.source_dims(),
            scale: tensor.scale(),
        }
    }
}

/// Runs inference and turns raw model output into ordered detections.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    min_score: f32,
    max_detections: usize,
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            max_detections: 20,
        }
    }
}

impl DetectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_score: config.min_score,
            max_detections: config.max_detections,
        }
    }

    /// Set the confidence threshold for filtering detections.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Cap the number of returned detections.
    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    /// Run the model on `tensor`.
    ///
    /// The tensor is consumed and dropped as soon as the model returns.
    pub async fn detect<M: DetectionModel + 'static>(
        &self,
        model: &ModelHandle<M>,
        tensor: ImageTensor,
    ) -> Result<Vec<Detection>, InferenceError> {
        if !model.model().is_ready() {
            return Err(InferenceError::ModelUnavailable);
        }
        if let Some(expected) = model.model().input_shape() {
            let got = tensor.shape();
            if got != expected {
                return Err(InferenceError::ShapeMismatch { expected, got });
            }
        }

        let geometry = TensorGeometry::of(&tensor);
        let sequence_id = tensor.sequence_id();
        let worker = model.clone();
        let raw = tokio::task::spawn_blocking(move || {
            let raw = worker.model().infer(&tensor);
            drop(tensor);
            raw
        })
        .await
        .map_err(|e| InferenceError::Backend(format!("inference worker failed: {e}")))??;

        let detections = self.normalize(model.model(), raw, geometry);
        debug!(sequence_id, count = detections.len(), "Inference complete");
        Ok(detections)
    }

    fn normalize<M: DetectionModel>(
        &self,
        model: &M,
        raw: Vec<RawDetection>,
        geometry: TensorGeometry,
    ) -> Vec<Detection> {
        let format = model.box_format();
        let labels = model.labels();
        let (sx, sy) = geometry.scale;
        let tensor_w = geometry.tensor.width as f32;
        let tensor_h = geometry.tensor.height as f32;
        let source_w = geometry.source.width as f32;
        let source_h = geometry.source.height as f32;

        let mut detections: Vec<Detection> = raw
            .into_iter()
            .filter_map(|d| {
                let class = d
                    .label
                    .or_else(|| d.class_id.and_then(|id| labels.get(id).cloned()));
                let mut builder = DetectionBuilder::new().bbox(format, d.bbox).score(d.score);
                if let Some(class) = class {
                    builder = builder.class(class);
                }
                let mut det = builder.build();

                if !det.bbox.is_finite() || !det.score.is_finite() {
                    warn!(class = %det.class, "Dropping detection with non-finite output");
                    return None;
                }

                det.score = det.score.clamp(0.0, 1.0);
                det.bbox = det
                    .bbox
                    .clamp_to(tensor_w, tensor_h)
                    .scale(sx, sy)
                    .clamp_to(source_w, source_h);
                Some(det)
            })
            .filter(|d| d.score >= self.min_score)
            .collect();

        // Stable sort keeps the model's order for equal scores.
        detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        detections.truncate(self.max_detections);
        detections
    }
}
