//! Integration module for connecting the pipeline to its collaborators.
//!
//! This module provides traits and utilities for plugging in the camera,
//! the OS permission prompt and inference backends (Burn, or any model that
//! implements [`DetectionModel`]).

mod builder;
mod camera;
mod model;

pub use builder::{DetectionBuilder, UNKNOWN_CLASS};
pub use camera::{CameraSource, ImageResource, PermissionGate, PermissionProvider, PermissionStatus};
pub use model::{
    BoxFormat, DetectionModel, ModelArtifact, ModelBackend, ModelDescriptor, ModelHandle,
    ModelLoader, ModelSlot, RawDetection, WeightGroup, WeightSpec,
};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnDetectionModel, BurnModel};
