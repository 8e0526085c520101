//! Tensor decoding: turns a captured image resource into an `H x W x 3` array.
//!
//! Decoding is all-or-nothing. The [`ImageTensor`] is only built once the
//! whole pixel grid has been decoded (and resized, if the model needs a fixed
//! input), so a truncated capture can never leak a half-filled tensor.

use image::imageops::{self, FilterType};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DecodeError;
use crate::pipeline::session::CaptureRequest;

/// Number of channels in every decoded tensor (RGB).
pub const CHANNELS: usize = 3;

/// Width and height of an image or viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Decoded pixel data for one capture.
///
/// Tensors are moved into inference and dropped there, never copied:
///
/// ```compile_fail
/// fn assert_clone<T: Clone>() {}
/// assert_clone::<nanomatrix::ImageTensor>();
/// ```
#[derive(Debug)]
pub struct ImageTensor {
    data: Array3<u8>,
    source_dims: Dimensions,
    scale: (f32, f32),
    sequence_id: u64,
}

impl ImageTensor {
    /// Wrap an already decoded `H x W x C` array that was not resized.
    pub fn new(data: Array3<u8>, sequence_id: u64) -> Self {
        let (height, width, _) = data.dim();
        Self {
            data,
            source_dims: Dimensions::new(width as u32, height as u32),
            scale: (1.0, 1.0),
            sequence_id,
        }
    }

    /// Wrap an array that was resized from `source_dims`.
    ///
    /// The recorded scale maps tensor pixels back to source pixels.
    pub fn resized(data: Array3<u8>, source_dims: Dimensions, sequence_id: u64) -> Self {
        let (height, width, _) = data.dim();
        let scale = (
            source_dims.width as f32 / width.max(1) as f32,
            source_dims.height as f32 / height.max(1) as f32,
        );
        Self {
            data,
            source_dims,
            scale,
            sequence_id,
        }
    }

    /// Shape as `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Dimensions of the tensor itself (after any resize).
    pub fn dims(&self) -> Dimensions {
        let (height, width, _) = self.data.dim();
        Dimensions::new(width as u32, height as u32)
    }

    /// Dimensions of the captured image before any resize.
    pub fn source_dims(&self) -> Dimensions {
        self.source_dims
    }

    /// Per-axis factor from tensor pixels to source pixels.
    pub fn scale(&self) -> (f32, f32) {
        self.scale
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }
}

/// Decodes captured frames into tensors.
#[derive(Debug, Clone, Default)]
pub struct TensorDecoder {
    input_size: Option<Dimensions>,
}

impl TensorDecoder {
    /// Decoder that keeps the captured resolution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize every frame to the fixed model input size.
    pub fn with_input_size(mut self, input_size: Option<Dimensions>) -> Self {
        self.input_size = input_size;
        self
    }

    /// Read, decode and (optionally) resize the frame referenced by `request`.
    ///
    /// The request is consumed; its image bytes are released as soon as the
    /// pixel grid has been built.
    pub async fn decode(&self, request: CaptureRequest) -> Result<ImageTensor, DecodeError> {
        self.decode_to(request, None).await
    }

    /// Like [`Self::decode`], resizing to `fallback` when the decoder has no
    /// fixed input size of its own.
    pub async fn decode_to(
        &self,
        request: CaptureRequest,
        fallback: Option<Dimensions>,
    ) -> Result<ImageTensor, DecodeError> {
        let sequence_id = request.sequence_id();
        let bytes = request.into_resource().into_bytes().await?;
        let input_size = self.input_size.or(fallback);

        tokio::task::spawn_blocking(move || decode_bytes(&bytes, input_size, sequence_id))
            .await
            .map_err(|e| DecodeError::Worker(e.to_string()))?
    }
}

/// Decode encoded image bytes into a tensor.
pub fn decode_bytes(
    bytes: &[u8],
    input_size: Option<Dimensions>,
    sequence_id: u64,
) -> Result<ImageTensor, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image = image::load_from_memory(bytes)?;
    let source = Dimensions::new(image.width(), image.height());
    if source.is_empty() {
        return Err(DecodeError::ZeroDimensions {
            width: source.width,
            height: source.height,
        });
    }

    let rgb = image.to_rgb8();
    match input_size {
        Some(target) if target != source && !target.is_empty() => {
            let resized = imageops::resize(&rgb, target.width, target.height, FilterType::Triangle);
            let data = Array3::from_shape_vec(
                (target.height as usize, target.width as usize, CHANNELS),
                resized.into_raw(),
            )?;
            let tensor = ImageTensor::resized(data, source, sequence_id);
            debug!(
                sequence_id,
                source_width = source.width,
                source_height = source.height,
                width = target.width,
                height = target.height,
                "Decoded and resized frame"
            );
            Ok(tensor)
        }
        _ => {
            let data = Array3::from_shape_vec(
                (source.height as usize, source.width as usize, CHANNELS),
                rgb.into_raw(),
            )?;
            debug!(
                sequence_id,
                width = source.width,
                height = source.height,
                "Decoded frame"
            );
            Ok(ImageTensor::new(data, sequence_id))
        }
    }
}
