//! Camera and permission collaborators.
//!
//! The camera hardware and the OS permission prompt live outside this crate.
//! They are reached through [`CameraSource`] and [`PermissionProvider`];
//! [`PermissionGate`] caches the authorization answer for the session.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{CameraError, DecodeError, PermissionError};
use crate::pipeline::PipelineState;

/// Opaque handle to a captured still image.
#[derive(Debug, Clone)]
pub enum ImageResource {
    /// Encoded image bytes held in memory.
    Encoded(Vec<u8>),
    /// Encoded image written to disk by the camera (a photo URI).
    File(PathBuf),
}

impl ImageResource {
    /// Read the raw encoded bytes behind the handle.
    pub async fn into_bytes(self) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::Encoded(bytes) => Ok(bytes),
            Self::File(path) => tokio::fs::read(&path)
                .await
                .map_err(|source| DecodeError::Read { path, source }),
        }
    }
}

/// Trait for camera hardware that can take a single still picture.
///
/// # Example
///
/// ```ignore
/// use nanomatrix::{CameraError, CameraSource, ImageResource};
///
/// struct FileCamera(std::path::PathBuf);
///
/// impl CameraSource for FileCamera {
///     async fn take_picture(&self) -> Result<ImageResource, CameraError> {
///         Ok(ImageResource::File(self.0.clone()))
///     }
/// }
/// ```
pub trait CameraSource: Send + Sync {
    /// Fire the shutter and return a handle to the encoded frame.
    fn take_picture(&self) -> impl Future<Output = Result<ImageResource, CameraError>> + Send;
}

/// Camera authorization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PermissionStatus {
    /// Not asked yet, or the user has not answered.
    #[default]
    Pending,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Platform permission subsystem.
pub trait PermissionProvider: Send + Sync {
    /// Show the OS prompt (if needed) and report the answer.
    fn request_camera_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, PermissionError>> + Send;
}

/// Asks for camera permission once and remembers the answer.
pub struct PermissionGate<P> {
    provider: P,
    resolved: Mutex<Option<PermissionStatus>>,
    state: Arc<PipelineState>,
}

impl<P: PermissionProvider> PermissionGate<P> {
    pub fn new(provider: P, state: Arc<PipelineState>) -> Self {
        Self {
            provider,
            resolved: Mutex::new(None),
            state,
        }
    }

    /// Request camera authorization.
    ///
    /// The first resolved answer is cached and recorded in the pipeline
    /// state; later calls return it without prompting. A provider error is
    /// logged and treated as a denial.
    pub async fn request_authorization(&self) -> PermissionStatus {
        let mut resolved = self.resolved.lock().await;
        if let Some(status) = *resolved {
            return status;
        }

        let status = match self.provider.request_camera_permission().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Camera permission request failed");
                PermissionStatus::Denied
            }
        };

        if status.is_resolved() {
            *resolved = Some(status);
            self.state.set_permission_status(status);
            info!(?status, "Camera permission resolved");
        }
        status
    }

    /// Cached status without prompting.
    pub fn status(&self) -> PermissionStatus {
        self.state.permission_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        answers: std::sync::Mutex<Vec<Result<PermissionStatus, PermissionError>>>,
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new(mut answers: Vec<Result<PermissionStatus, PermissionError>>) -> Self {
            answers.reverse();
            Self {
                answers: std::sync::Mutex::new(answers),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PermissionProvider for CountingProvider {
        async fn request_camera_permission(&self) -> Result<PermissionStatus, PermissionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(PermissionStatus::Pending))
        }
    }

    #[tokio::test]
    async fn test_granted_is_cached() {
        let state = Arc::new(PipelineState::new());
        let gate = PermissionGate::new(
            CountingProvider::new(vec![Ok(PermissionStatus::Granted)]),
            state.clone(),
        );

        assert_eq!(gate.request_authorization().await, PermissionStatus::Granted);
        assert_eq!(gate.request_authorization().await, PermissionStatus::Granted);
        assert_eq!(gate.provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.permission_status(), PermissionStatus::Granted);
    }

    #[tokio::test]
    async fn test_provider_error_resolves_to_denied() {
        let state = Arc::new(PipelineState::new());
        let gate = PermissionGate::new(
            CountingProvider::new(vec![Err(PermissionError("platform exploded".into()))]),
            state.clone(),
        );

        assert_eq!(gate.request_authorization().await, PermissionStatus::Denied);
        assert_eq!(gate.status(), PermissionStatus::Denied);
        assert_eq!(gate.request_authorization().await, PermissionStatus::Denied);
        assert_eq!(gate.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_is_not_cached() {
        let state = Arc::new(PipelineState::new());
        let gate = PermissionGate::new(
            CountingProvider::new(vec![
                Ok(PermissionStatus::Pending),
                Ok(PermissionStatus::Granted),
            ]),
            state.clone(),
        );

        assert_eq!(gate.request_authorization().await, PermissionStatus::Pending);
        assert_eq!(gate.status(), PermissionStatus::Pending);
        assert_eq!(gate.request_authorization().await, PermissionStatus::Granted);
        assert_eq!(gate.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_encoded_resource_bytes() {
        let bytes = ImageResource::Encoded(vec![1, 2, 3]).into_bytes().await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
