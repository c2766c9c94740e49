use std::cmp::Ordering;

/// Single object reported by a detector, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detection {
    /// `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: i64,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.bbox[0].max(other.bbox[0]);
        let iy1 = self.bbox[1].max(other.bbox[1]);
        let ix2 = self.bbox[2].min(other.bbox[2]);
        let iy2 = self.bbox[3].min(other.bbox[3]);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// Greedy per-class non-maximum suppression.
///
/// Output is sorted by descending score. Boxes of different classes never
/// suppress each other.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut suppressed = vec![false; detections.len()];
    let mut kept = Vec::with_capacity(detections.len());
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(detections[i]);
        for j in (i + 1)..detections.len() {
            if !suppressed[j]
                && detections[i].class_id == detections[j].class_id
                && detections[i].iou(&detections[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], score: f32, class_id: i64) -> Detection {
        Detection {
            bbox,
            score,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = det([0.0, 0.0, 10.0, 10.0], 0.9, 0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det([0.0, 0.0, 10.0, 10.0], 0.9, 0);
        let b = det([20.0, 20.0, 30.0, 30.0], 0.9, 0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn nms_keeps_highest_score_of_overlapping_boxes() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.5, 0),
                det([1.0, 1.0, 10.0, 10.0], 0.8, 0),
                det([50.0, 50.0, 60.0, 60.0], 0.3, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.8);
        assert_eq!(kept[1].score, 0.3);
    }

    #[test]
    fn nms_does_not_suppress_across_classes() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.9, 0),
                det([0.0, 0.0, 10.0, 10.0], 0.7, 2),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_of_nothing_is_nothing() {
        assert!(nms(Vec::new(), 0.5).is_empty());
    }
}
