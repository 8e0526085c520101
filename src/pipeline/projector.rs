//! Overlay projection from image pixels to viewport coordinates.
//!
//! # Coordinate System
//!
//! Detections are boxed in source image pixels. The camera preview shows the
//! image scaled into the viewport according to a [`ContentFit`], possibly
//! letterboxed and possibly mirrored for front-facing cameras. The projector
//! builds the matching 2D affine transform and applies it to every box.

use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::pipeline::engine::Detection;
use crate::pipeline::tensor::Dimensions;

/// How the preview scales the captured image into the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFit {
    /// Uniform scale, whole image visible, letterboxed
    #[default]
    Contain,
    /// Uniform scale, viewport filled, image cropped
    Cover,
    /// Independent scale per axis, image stretched
    Fill,
}

/// A detection expressed in viewport coordinates, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationOverlay {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Display label, e.g. `"dog 87.3%"`
    pub label: String,
    pub class: String,
    pub score: f32,
}

/// Format a detection label as `"<class> <percent with one decimal>%"`.
pub fn format_label(class: &str, score: f32) -> String {
    format!("{} {:.1}%", class, score * 100.0)
}

/// Maps detections into viewport space.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayProjector {
    fit: ContentFit,
    mirrored: bool,
}

impl OverlayProjector {
    pub fn new(fit: ContentFit) -> Self {
        Self {
            fit,
            mirrored: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.content_fit).with_mirroring(config.mirrored)
    }

    /// Flip boxes horizontally (selfie-style previews).
    pub fn with_mirroring(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Affine transform from source pixels to viewport pixels.
    ///
    /// Returns `None` when either size is empty.
    pub fn transform(&self, source: Dimensions, viewport: Dimensions) -> Option<Matrix3<f32>> {
        if source.is_empty() || viewport.is_empty() {
            return None;
        }

        let (vw, vh) = (viewport.width as f32, viewport.height as f32);
        let sx = vw / source.width as f32;
        let sy = vh / source.height as f32;
        let (sx, sy) = match self.fit {
            ContentFit::Contain => (sx.min(sy), sx.min(sy)),
            ContentFit::Cover => (sx.max(sy), sx.max(sy)),
            ContentFit::Fill => (sx, sy),
        };

        // Center the scaled image; offsets go negative when cropping.
        let offset_x = (vw - source.width as f32 * sx) / 2.0;
        let offset_y = (vh - source.height as f32 * sy) / 2.0;

        #[rustfmt::skip]
        let fit = Matrix3::new(
            sx, 0.0, offset_x,
            0.0, sy, offset_y,
            0.0, 0.0, 1.0,
        );

        if self.mirrored {
            #[rustfmt::skip]
            let mirror = Matrix3::new(
                -1.0, 0.0, vw,
                0.0, 1.0, 0.0,
                0.0, 0.0, 1.0,
            );
            Some(mirror * fit)
        } else {
            Some(fit)
        }
    }

    /// Project detections into drawable overlays, preserving order.
    pub fn project(
        &self,
        detections: &[Detection],
        source: Dimensions,
        viewport: Dimensions,
    ) -> Vec<AnnotationOverlay> {
        if detections.is_empty() {
            return Vec::new();
        }
        let Some(transform) = self.transform(source, viewport) else {
            warn!(?source, ?viewport, "Cannot project overlays onto an empty area");
            return Vec::new();
        };

        detections
            .iter()
            .map(|det| {
                let [x1, y1, x2, y2] = det.bbox.to_tlbr();
                let a = transform.transform_point(&Point2::new(x1, y1));
                let b = transform.transform_point(&Point2::new(x2, y2));
                AnnotationOverlay {
                    x: a.x.min(b.x),
                    y: a.y.min(b.y),
                    width: (b.x - a.x).abs(),
                    height: (b.y - a.y).abs(),
                    label: format_label(&det.class, det.score),
                    class: det.class.clone(),
                    score: det.score,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rect::Rect;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new("dog", 0.9, Rect::new(x, y, w, h))
    }

    fn boxes(overlays: &[AnnotationOverlay]) -> Vec<[f32; 4]> {
        overlays
            .iter()
            .map(|o| [o.x, o.y, o.width, o.height])
            .collect()
    }

    #[test]
    fn test_identity_projection() {
        let dims = Dimensions::new(640, 480);
        let dets = vec![det(10.0, 20.0, 100.0, 50.0), det(0.0, 0.0, 640.0, 480.0)];

        for fit in [ContentFit::Contain, ContentFit::Cover, ContentFit::Fill] {
            let overlays = OverlayProjector::new(fit).project(&dets, dims, dims);
            let expected: Vec<[f32; 4]> = dets.iter().map(|d| d.bbox.to_tlwh()).collect();
            assert_eq!(boxes(&overlays), expected);
        }
    }

    #[test]
    fn test_half_scale() {
        let overlays = OverlayProjector::default().project(
            &[det(10.0, 20.0, 100.0, 50.0)],
            Dimensions::new(640, 480),
            Dimensions::new(320, 240),
        );
        assert_eq!(boxes(&overlays), vec![[5.0, 10.0, 50.0, 25.0]]);
    }

    #[test]
    fn test_contain_letterboxes() {
        // 640x480 into 640x640: uniform scale 1, 80px bars top and bottom.
        let overlays = OverlayProjector::new(ContentFit::Contain).project(
            &[det(0.0, 0.0, 640.0, 480.0)],
            Dimensions::new(640, 480),
            Dimensions::new(640, 640),
        );
        assert_eq!(boxes(&overlays), vec![[0.0, 80.0, 640.0, 480.0]]);
    }

    #[test]
    fn test_cover_crops() {
        // 640x480 into 480x480: scale 1, 80px cropped on each side.
        let overlays = OverlayProjector::new(ContentFit::Cover).project(
            &[det(80.0, 0.0, 480.0, 480.0)],
            Dimensions::new(640, 480),
            Dimensions::new(480, 480),
        );
        assert_eq!(boxes(&overlays), vec![[0.0, 0.0, 480.0, 480.0]]);
    }

    #[test]
    fn test_fill_scales_axes_independently() {
        let overlays = OverlayProjector::new(ContentFit::Fill).project(
            &[det(10.0, 20.0, 100.0, 50.0)],
            Dimensions::new(640, 480),
            Dimensions::new(320, 960),
        );
        assert_eq!(boxes(&overlays), vec![[5.0, 40.0, 50.0, 100.0]]);
    }

    #[test]
    fn test_mirrored() {
        let dims = Dimensions::new(640, 480);
        let overlays = OverlayProjector::default()
            .with_mirroring(true)
            .project(&[det(10.0, 20.0, 100.0, 50.0)], dims, dims);
        assert_eq!(boxes(&overlays), vec![[530.0, 20.0, 100.0, 50.0]]);
    }

    #[test]
    fn test_label_format() {
        assert_eq!(format_label("cat", 0.8734), "cat 87.3%");
        assert_eq!(format_label("dog", 1.0), "dog 100.0%");
        assert_eq!(format_label("person", 0.5), "person 50.0%");
    }

    #[test]
    fn test_empty_inputs() {
        let projector = OverlayProjector::default();
        let dims = Dimensions::new(640, 480);
        assert!(projector.project(&[], dims, dims).is_empty());
        assert!(
            projector
                .project(&[det(1.0, 1.0, 1.0, 1.0)], Dimensions::new(0, 480), dims)
                .is_empty()
        );
    }
}
