//! Traits and loading for object detection inference backends.
//!
//! A model artifact is two-part: a JSON topology descriptor and one or more
//! weight shard blobs listed in its `weightsManifest`. [`ModelLoader`] checks
//! the artifact, hands it to a [`ModelBackend`] and stores the resulting
//! model in a shared [`ModelSlot`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use tracing::{error, info};

use crate::error::{InferenceError, ModelLoadError};
use crate::pipeline::{ImageTensor, ModelStatus, PipelineState};

/// Layout of the four numbers in [`RawDetection::bbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxFormat {
    /// Top-left x, top-left y, width, height
    #[default]
    Tlwh,
    /// Top-left x, top-left y, bottom-right x, bottom-right y
    Tlbr,
    /// Center x, center y, width, height
    CenterXywh,
}

/// Raw detection output from the model, in tensor pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Bounding box, layout given by [`DetectionModel::box_format`]
    pub bbox: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// Class index into [`DetectionModel::labels`]
    pub class_id: Option<usize>,
    /// Class name, when the model reports it directly
    pub label: Option<String>,
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use nanomatrix::{DetectionModel, ImageTensor, InferenceError, RawDetection};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionModel for MyDetector {
///     fn infer(&self, tensor: &ImageTensor) -> Result<Vec<RawDetection>, InferenceError> {
///         // Run inference and return raw detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionModel: Send + Sync {
    /// Run inference on a decoded tensor.
    fn infer(&self, tensor: &ImageTensor) -> Result<Vec<RawDetection>, InferenceError>;

    /// Expected tensor shape `(height, width, channels)`, if fixed.
    fn input_shape(&self) -> Option<(usize, usize, usize)> {
        None
    }

    /// Layout of the emitted boxes.
    fn box_format(&self) -> BoxFormat {
        BoxFormat::Tlwh
    }

    /// Class names indexed by [`RawDetection::class_id`].
    fn labels(&self) -> &[String] {
        &[]
    }

    /// False once the model has been disposed or otherwise gone stale.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Shared, cheaply cloneable reference to a loaded model.
pub struct ModelHandle<M> {
    model: Arc<M>,
}

impl<M> ModelHandle<M> {
    pub fn new(model: M) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M> fmt::Debug for ModelHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

/// One weight group of the topology descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    #[serde(default)]
    pub weights: Vec<WeightSpec>,
}

/// A named weight tensor inside a shard group.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub dtype: Option<String>,
}

/// Parsed topology descriptor (`model.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    #[serde(default)]
    pub format: Option<String>,
    pub model_topology: serde_json::Value,
    pub weights_manifest: Vec<WeightGroup>,
}

/// A validated two-part model artifact on disk.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    descriptor_path: PathBuf,
    descriptor: ModelDescriptor,
    weight_paths: Vec<PathBuf>,
}

impl ModelArtifact {
    /// Parse the descriptor at `path` and check that every weight shard exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelLoadError::Missing(path.to_path_buf()));
        }
        let raw = fs::read(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptor: ModelDescriptor =
            serde_json::from_slice(&raw).map_err(|e| ModelLoadError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if descriptor.model_topology.is_null() {
            return Err(ModelLoadError::Malformed {
                path: path.to_path_buf(),
                reason: "modelTopology is empty".to_string(),
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let weight_paths: Vec<PathBuf> = descriptor
            .weights_manifest
            .iter()
            .flat_map(|group| group.paths.iter())
            .map(|shard| base.join(shard))
            .collect();

        if weight_paths.is_empty() {
            return Err(ModelLoadError::Malformed {
                path: path.to_path_buf(),
                reason: "weightsManifest lists no weight files".to_string(),
            });
        }
        if let Some(missing) = weight_paths.iter().find(|p| !p.is_file()) {
            return Err(ModelLoadError::Missing(missing.clone()));
        }

        Ok(Self {
            descriptor_path: path.to_path_buf(),
            descriptor,
            weight_paths,
        })
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn weight_paths(&self) -> &[PathBuf] {
        &self.weight_paths
    }

    /// Concatenate all weight shards in manifest order.
    pub fn read_weights(&self) -> Result<Vec<u8>, ModelLoadError> {
        let mut weights = Vec::new();
        for path in &self.weight_paths {
            let shard = fs::read(path).map_err(|source| ModelLoadError::Io {
                path: path.clone(),
                source,
            })?;
            weights.extend_from_slice(&shard);
        }
        Ok(weights)
    }
}

/// Builds an inference-capable model from a validated artifact.
pub trait ModelBackend: Send + Sync + 'static {
    type Model: DetectionModel + 'static;

    fn load(&self, artifact: &ModelArtifact) -> Result<Self::Model, ModelLoadError>;
}

/// Write-once holder for the loaded model.
pub struct ModelSlot<M> {
    handle: OnceLock<ModelHandle<M>>,
}

impl<M> ModelSlot<M> {
    pub fn new() -> Self {
        Self {
            handle: OnceLock::new(),
        }
    }

    /// Slot that already holds a model.
    pub fn ready(model: M) -> Self {
        let slot = Self::new();
        let _ = slot.handle.set(ModelHandle::new(model));
        slot
    }

    pub fn handle(&self) -> Option<ModelHandle<M>> {
        self.handle.get().cloned()
    }

    fn fill(&self, handle: ModelHandle<M>) -> Result<(), ModelLoadError> {
        self.handle
            .set(handle)
            .map_err(|_| ModelLoadError::AlreadyLoaded)
    }
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads the model artifact once and publishes it to a [`ModelSlot`].
pub struct ModelLoader<B: ModelBackend> {
    backend: Arc<B>,
    slot: Arc<ModelSlot<B::Model>>,
    state: Arc<PipelineState>,
    started: AtomicBool,
}

impl<B: ModelBackend> ModelLoader<B> {
    pub fn new(backend: B, slot: Arc<ModelSlot<B::Model>>, state: Arc<PipelineState>) -> Self {
        Self {
            backend: Arc::new(backend),
            slot,
            state,
            started: AtomicBool::new(false),
        }
    }

    /// Load the artifact whose descriptor lives at `path`.
    ///
    /// Runs on the blocking pool. Only the first call does any work; the
    /// outcome is recorded in the pipeline state either way.
    pub async fn load(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ModelHandle<B::Model>, ModelLoadError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ModelLoadError::AlreadyLoaded);
        }

        let path = path.as_ref().to_path_buf();
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || {
            let artifact = ModelArtifact::open(&path)?;
            backend.load(&artifact)
        })
        .await
        .map_err(|e| ModelLoadError::Backend(e.to_string()))
        .and_then(|loaded| loaded);

        let result = result.and_then(|model| {
            let handle = ModelHandle::new(model);
            self.slot.fill(handle.clone())?;
            Ok(handle)
        });

        match result {
            Ok(handle) => {
                self.state.set_model_status(ModelStatus::Ready);
                info!("Detection model loaded");
                Ok(handle)
            }
            Err(e) => {
                error!(error = %e, "Error loading model");
                self.state.set_model_status(ModelStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullModel;

    impl DetectionModel for NullModel {
        fn infer(&self, _tensor: &ImageTensor) -> Result<Vec<RawDetection>, InferenceError> {
            Ok(vec![])
        }
    }

    struct NullBackend;

    impl ModelBackend for NullBackend {
        type Model = NullModel;

        fn load(&self, artifact: &ModelArtifact) -> Result<NullModel, ModelLoadError> {
            if artifact.read_weights()?.is_empty() {
                return Err(ModelLoadError::Backend("empty weights".into()));
            }
            Ok(NullModel)
        }
    }

    fn write_artifact(dir: &Path, shards: &[&str], write_shards: bool) -> PathBuf {
        let descriptor = serde_json::json!({
            "format": "graph-model",
            "modelTopology": { "node": [] },
            "weightsManifest": [{ "paths": shards, "weights": [] }],
        });
        let path = dir.join("model.json");
        fs::write(&path, serde_json::to_vec(&descriptor).unwrap()).unwrap();
        if write_shards {
            for shard in shards {
                fs::write(dir.join(shard), [1u8, 2, 3, 4]).unwrap();
            }
        }
        path
    }

    #[test]
    fn test_open_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &["group1-shard1of2.bin", "group1-shard2of2.bin"], true);

        let artifact = ModelArtifact::open(&path).unwrap();
        assert_eq!(artifact.weight_paths().len(), 2);
        assert_eq!(artifact.descriptor().format.as_deref(), Some("graph-model"));
        assert_eq!(artifact.read_weights().unwrap().len(), 8);
    }

    #[test]
    fn test_open_missing_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::open(dir.path().join("model.json")).unwrap_err();
        assert!(matches!(err, ModelLoadError::Missing(_)));
    }

    #[test]
    fn test_open_missing_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &["group1-shard1of1.bin"], false);
        let err = ModelArtifact::open(&path).unwrap_err();
        assert!(matches!(err, ModelLoadError::Missing(p) if p.ends_with("group1-shard1of1.bin")));
    }

    #[test]
    fn test_open_malformed_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            ModelArtifact::open(&path),
            Err(ModelLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_open_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &[], true);
        assert!(matches!(
            ModelArtifact::open(&path),
            Err(ModelLoadError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_loader_fills_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &["weights.bin"], true);
        let state = Arc::new(PipelineState::new());
        let slot = Arc::new(ModelSlot::new());
        let loader = ModelLoader::new(NullBackend, slot.clone(), state.clone());

        assert!(slot.handle().is_none());
        loader.load(&path).await.unwrap();
        assert!(slot.handle().is_some());
        assert_eq!(state.model_status(), ModelStatus::Ready);

        assert!(matches!(
            loader.load(&path).await,
            Err(ModelLoadError::AlreadyLoaded)
        ));
    }

    #[tokio::test]
    async fn test_loader_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(PipelineState::new());
        let slot = Arc::new(ModelSlot::new());
        let loader = ModelLoader::new(NullBackend, slot.clone(), state.clone());

        let err = loader.load(dir.path().join("model.json")).await.unwrap_err();
        assert!(matches!(err, ModelLoadError::Missing(_)));
        assert!(slot.handle().is_none());
        assert!(matches!(state.model_status(), ModelStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_shared_slot_keeps_first_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &["weights.bin"], true);
        let state = Arc::new(PipelineState::new());
        let slot = Arc::new(ModelSlot::new());
        let first = ModelLoader::new(NullBackend, slot.clone(), state.clone());
        let second = ModelLoader::new(NullBackend, slot.clone(), state.clone());

        let handle = first.load(&path).await.unwrap();
        assert!(matches!(
            second.load(&path).await,
            Err(ModelLoadError::AlreadyLoaded)
        ));

        let kept = slot.handle().unwrap();
        assert!(std::ptr::eq(kept.model(), handle.model()));
        assert_eq!(state.model_status(), ModelStatus::Ready);
    }
}
