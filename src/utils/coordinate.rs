use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in source-image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// iou computes the intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        };

        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// clamped restricts the box to an image of the given dimensions.
    pub fn clamped(&self, img_w: u32, img_h: u32) -> FaceBox {
        FaceBox {
            x1: self.x1.clamp(0.0, img_w as f32),
            y1: self.y1.clamp(0.0, img_h as f32),
            x2: self.x2.clamp(0.0, img_w as f32),
            y2: self.y2.clamp(0.0, img_h as f32),
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_box(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, score: 1.0 }
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = face_box(10.0, 10.0, 60.0, 60.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = face_box(0.0, 0.0, 10.0, 10.0);
        let b = face_box(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = face_box(0.0, 0.0, 10.0, 10.0);
        let b = face_box(5.0, 5.0, 15.0, 15.0);
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
    }

    #[test]
    fn test_clamped_to_image_bounds() {
        let a = face_box(-5.0, -5.0, 700.0, 500.0);
        let clamped = a.clamped(640, 480);
        assert_eq!(clamped.x1, 0.0);
        assert_eq!(clamped.y1, 0.0);
        assert_eq!(clamped.x2, 640.0);
        assert_eq!(clamped.y2, 480.0);
    }
}
