//! Process-wide pipeline state, passed explicitly to whoever needs it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use crate::error::PipelineError;
use crate::integration::PermissionStatus;
use crate::pipeline::projector::AnnotationOverlay;

/// Capture session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Ready for a capture trigger
    #[default]
    Idle,
    /// Waiting on the camera
    Capturing,
    /// Turning the frame into a tensor
    Decoding,
    /// Running the model
    Inferring,
    /// Result replaced the visible overlays
    Published,
    /// Stage failure; the session falls back to idle
    Failed,
}

/// Pipeline stage a request can time out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Decode,
    Inference,
}

impl Stage {
    pub fn phase(self) -> SessionPhase {
        match self {
            Stage::Capture => SessionPhase::Capturing,
            Stage::Decode => SessionPhase::Decoding,
            Stage::Inference => SessionPhase::Inferring,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Capture => "capture",
            Stage::Decode => "decode",
            Stage::Inference => "inference",
        };
        f.write_str(label)
    }
}

/// Model readiness as seen by the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelStatus {
    #[default]
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Default)]
struct Cursor {
    phase: SessionPhase,
    in_flight: Option<u64>,
}

#[derive(Debug)]
struct Published {
    sequence_id: Option<u64>,
    overlays: Arc<[AnnotationOverlay]>,
}

/// Shared state of one pipeline instance.
///
/// Permission and model status are written once. The published overlay list
/// is only ever replaced whole, under a write lock, by the request that is
/// still in flight.
#[derive(Debug)]
pub struct PipelineState {
    permission: OnceLock<PermissionStatus>,
    model: OnceLock<ModelStatus>,
    next_sequence: AtomicU64,
    cursor: Mutex<Cursor>,
    published: RwLock<Published>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            permission: OnceLock::new(),
            model: OnceLock::new(),
            next_sequence: AtomicU64::new(0),
            cursor: Mutex::new(Cursor::default()),
            published: RwLock::new(Published {
                sequence_id: None,
                overlays: Arc::from(Vec::new()),
            }),
        }
    }

    pub fn permission_status(&self) -> PermissionStatus {
        self.permission.get().copied().unwrap_or_default()
    }

    /// Record the resolved permission. Returns false if it was already set.
    pub fn set_permission_status(&self, status: PermissionStatus) -> bool {
        self.permission.set(status).is_ok()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.get().cloned().unwrap_or_default()
    }

    /// Record the model load outcome. Returns false if it was already set.
    pub fn set_model_status(&self, status: ModelStatus) -> bool {
        self.model.set(status).is_ok()
    }

    /// Overlays currently on screen.
    pub fn latest_annotations(&self) -> Arc<[AnnotationOverlay]> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&published.overlays)
    }

    /// Sequence id of the request that produced [`Self::latest_annotations`].
    pub fn published_sequence_id(&self) -> Option<u64> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sequence_id
    }

    pub fn in_flight_sequence_id(&self) -> Option<u64> {
        self.cursor().in_flight
    }

    pub fn phase(&self) -> SessionPhase {
        self.cursor().phase
    }

    /// Allocate a sequence id and make it the in-flight request.
    ///
    /// Any request already in flight is superseded.
    pub fn begin_request(&self) -> u64 {
        let mut cursor = self.cursor();
        let sequence_id = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        cursor.in_flight = Some(sequence_id);
        cursor.phase = SessionPhase::Capturing;
        sequence_id
    }

    /// Most recently allocated sequence id, 0 before the first trigger.
    pub fn latest_sequence_id(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, sequence_id: u64) -> bool {
        self.cursor().in_flight == Some(sequence_id)
    }

    /// Move the in-flight request to `phase`. Stale requests are ignored.
    pub fn advance(&self, sequence_id: u64, phase: SessionPhase) -> bool {
        let mut cursor = self.cursor();
        if cursor.in_flight != Some(sequence_id) {
            return false;
        }
        cursor.phase = phase;
        true
    }

    /// Replace the published overlays if `sequence_id` is still in flight.
    ///
    /// On success the session returns to idle. A superseded request gets
    /// [`PipelineError::StaleResultDiscarded`] and changes nothing.
    pub fn publish(
        &self,
        sequence_id: u64,
        overlays: Vec<AnnotationOverlay>,
    ) -> Result<(), PipelineError> {
        let mut cursor = self.cursor();
        if cursor.in_flight != Some(sequence_id) {
            return Err(PipelineError::StaleResultDiscarded {
                sequence_id,
                current: self.latest_sequence_id(),
            });
        }

        {
            let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
            published.sequence_id = Some(sequence_id);
            published.overlays = Arc::from(overlays);
        }
        cursor.in_flight = None;
        cursor.phase = SessionPhase::Idle;
        Ok(())
    }

    /// Abandon the in-flight request after a failure, keeping the overlays.
    ///
    /// Returns false when `sequence_id` was already superseded.
    pub fn fail(&self, sequence_id: u64) -> bool {
        let mut cursor = self.cursor();
        if cursor.in_flight != Some(sequence_id) {
            return false;
        }
        cursor.in_flight = None;
        cursor.phase = SessionPhase::Idle;
        true
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
