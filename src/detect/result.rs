use serde::Serialize;

/// Axis-aligned box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Box from center coordinates and extent (YOLO output layout).
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp into `[0, width] x [0, height]`.
    ///
    /// Returns `None` when a coordinate is not finite or the clamped box has no
    /// area, so every box that survives satisfies `min < max` on both axes.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        let clamped = BoundingBox {
            x_min: self.x_min.min(self.x_max).clamp(0.0, w),
            y_min: self.y_min.min(self.y_max).clamp(0.0, h),
            x_max: self.x_max.max(self.x_min).clamp(0.0, w),
            y_max: self.y_max.max(self.y_min).clamp(0.0, h),
        };
        if clamped.x_min < clamped.x_max && clamped.y_min < clamped.y_max {
            Some(clamped)
        } else {
            None
        }
    }
}

/// What a detector backend reports for one candidate object.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub label: String,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f32, label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            label: label.into(),
        }
    }
}

/// A detection on a sampled frame.
///
/// `display_label` starts out equal to `source_label`; only the label policy
/// produces detections where the two differ.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    source_label: String,
    display_label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, source_label: impl Into<String>) -> Self {
        let source_label = source_label.into();
        Self {
            bbox,
            confidence,
            display_label: source_label.clone(),
            source_label,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub fn display_label(&self) -> &str {
        &self.display_label
    }

    /// New detection with the same geometry and score under another display label.
    pub(crate) fn relabeled(&self, display_label: &str) -> Detection {
        Detection {
            bbox: self.bbox,
            confidence: self.confidence,
            source_label: self.source_label.clone(),
            display_label: display_label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let bbox = BoundingBox::new(-12.0, 5.0, 700.0, 40.0);
        let clamped = bbox.clamp_to(640, 480).unwrap();
        assert_eq!(clamped, BoundingBox::new(0.0, 5.0, 640.0, 40.0));
    }

    #[test]
    fn clamp_rejects_degenerate_boxes() {
        assert!(BoundingBox::new(650.0, 10.0, 700.0, 20.0)
            .clamp_to(640, 480)
            .is_none());
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 20.0)
            .clamp_to(640, 480)
            .is_none());
        assert!(BoundingBox::new(f32::NAN, 10.0, 30.0, 20.0)
            .clamp_to(640, 480)
            .is_none());
    }

    #[test]
    fn clamp_orders_swapped_corners() {
        let clamped = BoundingBox::new(30.0, 40.0, 10.0, 20.0)
            .clamp_to(100, 100)
            .unwrap();
        assert_eq!(clamped, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn new_detection_displays_source_label() {
        let det = Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.5, "scissors");
        assert_eq!(det.display_label(), "scissors");
        let relabeled = det.relabeled("surgical forceps");
        assert_eq!(relabeled.source_label(), "scissors");
        assert_eq!(relabeled.display_label(), "surgical forceps");
        assert_eq!(det.display_label(), "scissors");
    }
}
