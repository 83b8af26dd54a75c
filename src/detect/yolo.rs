//! YOLO output decoding shared by model backends.
//!
//! Two output layouts are understood:
//! - `[1, N, 5 + C]`: one row per proposal, `cx, cy, w, h, objectness, scores..` (YOLOv5)
//! - `[1, 4 + C, N]`: one column per proposal, `cx, cy, w, h, scores..` (YOLOv8)

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, RawDetection};

pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// Model input to source raster scale factors.
    pub scale_x: f32,
    pub scale_y: f32,
}

/// Decode a raw output tensor (`shape`, row-major `data`) into detections in
/// source raster coordinates, after score floor and class-aware NMS.
pub fn decode_output(
    shape: &[usize],
    data: &[f32],
    params: DecodeParams,
) -> Result<Vec<RawDetection>> {
    let [batch, rows, cols] = shape else {
        return Err(anyhow!("expected a rank-3 output tensor, got shape {:?}", shape));
    };
    let (batch, rows, cols) = (*batch, *rows, *cols);
    if batch != 1 {
        return Err(anyhow!("expected batch size 1, got {}", batch));
    }
    if data.len() != rows * cols {
        return Err(anyhow!(
            "output tensor has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * cols
        ));
    }

    let coco_attrs = |n: usize| n == COCO_CLASSES.len() + 4 || n == COCO_CLASSES.len() + 5;
    let channels_first = if coco_attrs(cols) {
        false
    } else if coco_attrs(rows) {
        true
    } else {
        cols > rows
    };
    let (proposals, attrs) = if channels_first {
        (cols, rows)
    } else {
        (rows, cols)
    };
    let has_objectness = !channels_first && attrs != COCO_CLASSES.len() + 4;
    let first_class = if has_objectness { 5 } else { 4 };
    if attrs <= first_class {
        return Err(anyhow!("output has no class scores (shape {:?})", shape));
    }

    let at = |proposal: usize, attr: usize| -> f32 {
        if channels_first {
            data[attr * cols + proposal]
        } else {
            data[proposal * cols + attr]
        }
    };

    let mut candidates = Vec::new();
    for p in 0..proposals {
        let objectness = if has_objectness { at(p, 4) } else { 1.0 };
        let (class_id, class_score) = (first_class..attrs)
            .map(|attr| (attr - first_class, at(p, attr)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        let score = objectness * class_score;
        if !score.is_finite() || score < params.score_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(at(p, 0), at(p, 1), at(p, 2), at(p, 3));
        let bbox = BoundingBox::new(
            bbox.x_min * params.scale_x,
            bbox.y_min * params.scale_y,
            bbox.x_max * params.scale_x,
            bbox.y_max * params.scale_y,
        );
        candidates.push(RawDetection::new(bbox, score, class_name(class_id)));
    }

    Ok(non_max_suppression(candidates, params.iou_threshold))
}

/// Greedy per-class NMS. Output is ordered by descending confidence.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCISSORS: usize = 76;

    fn params() -> DecodeParams {
        DecodeParams {
            score_threshold: 0.25,
            iou_threshold: 0.45,
            scale_x: 2.0,
            scale_y: 1.0,
        }
    }

    #[test]
    fn scissors_is_a_coco_class() {
        assert_eq!(class_name(SCISSORS), "scissors");
        assert_eq!(class_name(90), "class_90");
    }

    #[test]
    fn decodes_row_major_v5_output() {
        let attrs = 85;
        let mut data = vec![0.0f32; 2 * attrs];
        // proposal 0: scissors at 0.9 * 0.8
        data[..5].copy_from_slice(&[50.0, 40.0, 20.0, 10.0, 0.9]);
        data[5 + SCISSORS] = 0.8;
        // proposal 1: below threshold
        data[attrs..attrs + 5].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.2]);
        data[attrs + 5] = 0.5;

        let dets = decode_output(&[1, 2, attrs], &data, params()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "scissors");
        assert!((dets[0].confidence - 0.72).abs() < 1e-6);
        assert_eq!(dets[0].bbox, BoundingBox::new(80.0, 35.0, 120.0, 45.0));
    }

    #[test]
    fn decodes_channels_first_v8_output() {
        let proposals = 100;
        let attrs = 84;
        let mut data = vec![0.0f32; attrs * proposals];
        let p = 7;
        for (attr, value) in [30.0, 30.0, 10.0, 10.0].iter().enumerate() {
            data[attr * proposals + p] = *value;
        }
        data[(4 + SCISSORS) * proposals + p] = 0.6;

        let dets = decode_output(&[1, attrs, proposals], &data, params()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "scissors");
        assert!((dets[0].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_same_class_overlaps_only() {
        let a = RawDetection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9, "scissors");
        let b = RawDetection::new(BoundingBox::new(1.0, 1.0, 11.0, 11.0), 0.8, "scissors");
        let c = RawDetection::new(BoundingBox::new(1.0, 1.0, 11.0, 11.0), 0.7, "knife");
        let kept = non_max_suppression(vec![b, c, a], 0.45);
        let labels: Vec<_> = kept.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(labels, vec![("scissors", 0.9), ("knife", 0.7)]);
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(decode_output(&[1, 85], &[0.0; 85], params()).is_err());
        assert!(decode_output(&[2, 1, 85], &[0.0; 170], params()).is_err());
        assert!(decode_output(&[1, 1, 85], &[0.0; 10], params()).is_err());
    }
}
