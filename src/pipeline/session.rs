//! Capture session controller.
//!
//! Drives one user-triggered capture through
//! `Capturing -> Decoding -> Inferring -> Published` and owns the decision of
//! which result reaches the screen. Overlapping triggers use a supersede
//! policy: the newest trigger becomes the in-flight request immediately and
//! older requests are left to finish, then dropped at the publish check.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::integration::{
    CameraSource, DetectionModel, ImageResource, ModelBackend, ModelHandle, ModelLoader,
    ModelSlot, PermissionGate, PermissionProvider, PermissionStatus,
};
use crate::pipeline::engine::{Detection, DetectionEngine};
use crate::pipeline::projector::OverlayProjector;
use crate::pipeline::state::{ModelStatus, PipelineState, SessionPhase, Stage};
use crate::pipeline::tensor::{Dimensions, TensorDecoder};

/// A single user-initiated capture.
#[derive(Debug)]
pub struct CaptureRequest {
    sequence_id: u64,
    resource: ImageResource,
    created_at: SystemTime,
}

impl CaptureRequest {
    pub fn new(sequence_id: u64, resource: ImageResource) -> Self {
        Self {
            sequence_id,
            resource,
            created_at: SystemTime::now(),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn resource(&self) -> &ImageResource {
        &self.resource
    }

    pub fn into_resource(self) -> ImageResource {
        self.resource
    }
}

/// How a capture trigger ended.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// The result replaced the visible overlays.
    Published { sequence_id: u64, overlays: usize },
    /// A newer trigger superseded this one; its result was dropped.
    Discarded { sequence_id: u64, superseded_by: u64 },
    /// The capture failed. `sequence_id` is `None` when it was refused
    /// before a request was allocated.
    Failed {
        sequence_id: Option<u64>,
        error: PipelineError,
    },
}

impl CaptureOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Orchestrates capture, decode, inference, projection and publication.
pub struct CaptureSession<C, M> {
    camera: C,
    model: Arc<ModelSlot<M>>,
    state: Arc<PipelineState>,
    decoder: TensorDecoder,
    engine: DetectionEngine,
    projector: OverlayProjector,
    viewport: RwLock<Option<Dimensions>>,
    stage_timeout: Duration,
}

impl<C, M> CaptureSession<C, M>
where
    C: CameraSource,
    M: DetectionModel + 'static,
{
    pub fn new(
        camera: C,
        model: Arc<ModelSlot<M>>,
        state: Arc<PipelineState>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            camera,
            model,
            state,
            decoder: TensorDecoder::new().with_input_size(config.input_shape),
            engine: DetectionEngine::from_config(config),
            projector: OverlayProjector::from_config(config),
            viewport: RwLock::new(None),
            stage_timeout: config.stage_timeout(),
        }
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// Set the on-screen size of the camera preview.
    ///
    /// Until set, overlays are projected at source resolution.
    pub fn set_viewport(&self, viewport: Dimensions) {
        *self.viewport.write().unwrap_or_else(PoisonError::into_inner) = Some(viewport);
    }

    /// Whether the capture trigger should be offered to the user.
    pub fn is_capture_enabled(&self) -> bool {
        self.state.permission_status() == PermissionStatus::Granted && self.model.handle().is_some()
    }

    /// Handle a capture trigger.
    ///
    /// Never panics or returns an error to the caller: every failure ends up
    /// in [`CaptureOutcome::Failed`] and leaves the last good overlays in
    /// place.
    pub async fn trigger(&self) -> CaptureOutcome {
        let model = match self.preflight() {
            Ok(model) => model,
            Err(error) => {
                warn!(error = %error, "Capture refused");
                return CaptureOutcome::Failed {
                    sequence_id: None,
                    error,
                };
            }
        };

        let sequence_id = self.state.begin_request();
        info!(sequence_id, "Capture triggered");

        let (detections, source) = match self.run(sequence_id, &model).await {
            Ok(result) => result,
            Err(error) => {
                if self.state.fail(sequence_id) {
                    error!(
                        sequence_id,
                        error = %error,
                        phase = ?SessionPhase::Failed,
                        "Capture failed"
                    );
                } else {
                    debug!(sequence_id, error = %error, "Superseded capture failed");
                }
                return CaptureOutcome::Failed {
                    sequence_id: Some(sequence_id),
                    error,
                };
            }
        };

        self.publish(sequence_id, &detections, source)
    }

    fn preflight(&self) -> Result<ModelHandle<M>, PipelineError> {
        // An unanswered prompt gates the trigger the same way a denial does.
        let permission = self.state.permission_status();
        if permission != PermissionStatus::Granted {
            debug!(?permission, "Camera permission not granted");
            return Err(PipelineError::PermissionDenied);
        }
        self.model.handle().ok_or_else(|| {
            let reason = match self.state.model_status() {
                ModelStatus::Failed(reason) => format!("model failed to load: {reason}"),
                _ => "model is still loading".to_string(),
            };
            PipelineError::ModelNotReady { reason }
        })
    }

    async fn run(
        &self,
        sequence_id: u64,
        model: &ModelHandle<M>,
    ) -> Result<(Vec<Detection>, Dimensions), PipelineError> {
        let resource = self.bounded(Stage::Capture, self.camera.take_picture()).await?;
        let request = CaptureRequest::new(sequence_id, resource);

        // Configured input size wins over the one the model declares.
        let declared = model
            .model()
            .input_shape()
            .map(|(height, width, _)| Dimensions::new(width as u32, height as u32));

        self.state.advance(sequence_id, Stage::Decode.phase());
        let tensor = self
            .bounded(Stage::Decode, self.decoder.decode_to(request, declared))
            .await?;
        let source = tensor.source_dims();

        self.state.advance(sequence_id, Stage::Inference.phase());
        let detections = self
            .bounded(Stage::Inference, self.engine.detect(model, tensor))
            .await?;

        Ok((detections, source))
    }

    fn publish(
        &self,
        sequence_id: u64,
        detections: &[Detection],
        source: Dimensions,
    ) -> CaptureOutcome {
        if !self.state.is_current(sequence_id) {
            return self.discarded(sequence_id);
        }

        let viewport = self
            .viewport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(source);
        let overlays = self.projector.project(detections, source, viewport);
        let count = overlays.len();

        match self.state.publish(sequence_id, overlays) {
            Ok(()) => {
                info!(
                    sequence_id,
                    overlays = count,
                    phase = ?SessionPhase::Published,
                    "Published detections"
                );
                CaptureOutcome::Published {
                    sequence_id,
                    overlays: count,
                }
            }
            Err(_) => self.discarded(sequence_id),
        }
    }

    fn discarded(&self, sequence_id: u64) -> CaptureOutcome {
        let superseded_by = self.state.latest_sequence_id();
        let signal = PipelineError::StaleResultDiscarded {
            sequence_id,
            current: superseded_by,
        };
        debug!(sequence_id, superseded_by, "{signal}");
        CaptureOutcome::Discarded {
            sequence_id,
            superseded_by,
        }
    }

    async fn bounded<T, E>(
        &self,
        stage: Stage,
        future: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PipelineError>
    where
        PipelineError: From<E>,
    {
        match tokio::time::timeout(self.stage_timeout, future).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PipelineError::Timeout {
                stage,
                after: self.stage_timeout,
            }),
        }
    }
}

/// Start a pipeline: ask for camera permission and load the model
/// concurrently, then build the capture session.
///
/// Neither a denied permission nor a failed model load is fatal; the session
/// is returned either way and refuses captures until it can serve them.
pub async fn bootstrap<P, B, C>(
    config: &PipelineConfig,
    permissions: P,
    backend: B,
    camera: C,
) -> CaptureSession<C, B::Model>
where
    P: PermissionProvider,
    B: ModelBackend,
    C: CameraSource,
{
    let state = Arc::new(PipelineState::new());
    let slot = Arc::new(ModelSlot::new());
    let gate = PermissionGate::new(permissions, Arc::clone(&state));
    let loader = ModelLoader::new(backend, Arc::clone(&slot), Arc::clone(&state));
    let model_path: &Path = &config.model_path;

    let (permission, model) = tokio::join!(gate.request_authorization(), loader.load(model_path));

    if permission != PermissionStatus::Granted {
        warn!(?permission, "Camera capture disabled until permission is granted");
    }
    if model.is_err() {
        warn!("Camera stays available; captures are refused until a model loads");
    }

    CaptureSession::new(camera, slot, state, config)
}
