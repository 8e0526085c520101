//! Builder for creating Detection objects from various input formats.

use crate::integration::BoxFormat;
use crate::pipeline::{Detection, Rect};

/// Class name used when the model reports neither a label nor a known index.
pub const UNKNOWN_CLASS: &str = "unknown";

/// Builder for creating `Detection` objects from various input formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
    class: Option<String>,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_center(cx, cy, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(x, y, w, h);
        self
    }

    /// Set the bounding box from four raw numbers in the given layout.
    pub fn bbox(self, format: BoxFormat, [a, b, c, d]: [f32; 4]) -> Self {
        match format {
            BoxFormat::Tlwh => self.tlwh(a, b, c, d),
            BoxFormat::Tlbr => self.tlbr(a, b, c, d),
            BoxFormat::CenterXywh => self.xywh(a, b, c, d),
        }
    }

    /// Set the confidence score.
    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Set the class label.
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        let class = self.class.unwrap_or_else(|| UNKNOWN_CLASS.to_string());
        Detection::new(class, self.score, self.bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .score(0.95)
            .class("dog")
            .build();

        assert_eq!(det.score, 0.95);
        assert_eq!(det.class, "dog");
        assert_eq!(det.bbox.to_tlwh(), [10.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn test_box_formats_agree() {
        let tlwh = DetectionBuilder::new()
            .bbox(BoxFormat::Tlwh, [10.0, 20.0, 100.0, 50.0])
            .build();
        let tlbr = DetectionBuilder::new()
            .bbox(BoxFormat::Tlbr, [10.0, 20.0, 110.0, 70.0])
            .build();
        let center = DetectionBuilder::new()
            .bbox(BoxFormat::CenterXywh, [60.0, 45.0, 100.0, 50.0])
            .build();

        assert_eq!(tlwh.bbox, tlbr.bbox);
        assert_eq!(tlwh.bbox, center.bbox);
    }

    #[test]
    fn test_missing_class_is_unknown() {
        let det = DetectionBuilder::new().score(0.5).build();
        assert_eq!(det.class, UNKNOWN_CLASS);
    }
}
