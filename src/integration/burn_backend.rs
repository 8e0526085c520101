//! Burn inference backend for object detection.
//!
//! This module provides a `BurnDetectionModel` that implements `DetectionModel`
//! for running object detection models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use nanomatrix::integration::{BurnDetectionModel, BurnModel};
//! use burn::backend::NdArray;
//!
//! // Implement BurnModel for your detection model
//! struct MySsdModel { /* ... */ }
//!
//! impl BurnModel<NdArray> for MySsdModel {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<RawDetection> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MySsdModel::load("model.bin");
//! let detector = BurnDetectionModel::new(model, Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;

use super::{BoxFormat, DetectionModel, RawDetection};
use crate::error::InferenceError;
use crate::pipeline::ImageTensor;

/// Trait for Burn-based detection models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on the input tensor.
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape [batch, channels, height, width], values in [0, 1]
    ///
    /// # Returns
    /// Vector of raw detections in input pixel coordinates.
    fn forward(&self, input: Tensor<B, 4>) -> Vec<RawDetection>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (u32, u32, u32) {
        (3, 640, 640) // Default YOLO input size
    }

    /// Layout of the emitted boxes.
    fn box_format(&self) -> BoxFormat {
        BoxFormat::CenterXywh // Most YOLO variants use XYWH
    }

    /// Class names indexed by the model's class ids.
    fn labels(&self) -> &[String] {
        &[]
    }
}

/// Burn-based model implementing `DetectionModel`.
pub struct BurnDetectionModel<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnModel<B>> BurnDetectionModel<B, M> {
    /// Create a new Burn detection model with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Convert an `H x W x C` byte tensor to a normalized `[1, C, H, W]` Burn tensor.
    pub fn preprocess(&self, tensor: &ImageTensor) -> Result<Tensor<B, 4>, InferenceError> {
        let (height, width, channels) = tensor.shape();
        if channels == 0 || height == 0 || width == 0 {
            return Err(InferenceError::Preprocessing(format!(
                "cannot build an input from a {height}x{width}x{channels} tensor"
            )));
        }

        // HWC -> CHW, u8 -> f32 in [0, 1]
        let data: Vec<f32> = tensor
            .data()
            .view()
            .permuted_axes([2, 0, 1])
            .iter()
            .map(|&x| x as f32 / 255.0)
            .collect();

        Ok(
            Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
                1, channels, height, width,
            ]),
        )
    }
}

impl<B, M> DetectionModel for BurnDetectionModel<B, M>
where
    B: Backend,
    M: BurnModel<B>,
    B::Device: Send + Sync,
{
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<RawDetection>, InferenceError> {
        let input = self.preprocess(tensor)?;
        Ok(self.model.forward(input))
    }

    fn input_shape(&self) -> Option<(usize, usize, usize)> {
        let (channels, height, width) = self.model.input_size();
        Some((height as usize, width as usize, channels as usize))
    }

    fn box_format(&self) -> BoxFormat {
        self.model.box_format()
    }

    fn labels(&self) -> &[String] {
        self.model.labels()
    }
}
