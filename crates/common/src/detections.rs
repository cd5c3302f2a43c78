//! Detection contracts shared by detector adapters and the crowd engine.
//!
//! Boxes use corner coordinates in the pixel space of the image the detector
//! was run on. Nothing here assumes the box is well-formed; consumers decide
//! how to treat degenerate boxes.

use serde::{Deserialize, Serialize};

/// COCO class index of "person".
pub const PERSON_CLASS_ID: u32 = 0;

/// COCO label of "person".
pub const PERSON_LABEL: &str = "person";

/// Axis-aligned bounding box (x1, y1) top-left, (x2, y2) bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a (x, y, width, height) rectangle
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x.saturating_add(width),
            y2: y.saturating_add(height),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    /// A box is well-formed when it has strictly positive width and height
    pub fn is_well_formed(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn area(&self) -> i64 {
        if !self.is_well_formed() {
            return 0;
        }
        i64::from(self.width()) * i64::from(self.height())
    }

    /// Intersection over Union with another box (0.0 when either is degenerate)
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            i64::from(x2 - x1) * i64::from(y2 - y1)
        } else {
            0
        };

        let union = self.area() + other.area() - intersection;
        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }
}

/// One object reported by a detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object class label (e.g. "person")
    pub class: String,

    /// Numeric class index when the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    pub bbox: BoundingBox,
}

impl Detection {
    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            class: PERSON_LABEL.to_string(),
            class_id: Some(PERSON_CLASS_ID),
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed() {
        assert!(BoundingBox::new(0, 0, 10, 10).is_well_formed());
        assert!(!BoundingBox::new(10, 0, 10, 10).is_well_formed());
        assert!(!BoundingBox::new(0, 12, 10, 10).is_well_formed());
        assert_eq!(BoundingBox::new(10, 0, 5, 10).area(), 0);
    }

    #[test]
    fn test_from_xywh() {
        let bbox = BoundingBox::from_xywh(100, 200, 50, 100);
        assert_eq!(bbox, BoundingBox::new(100, 200, 150, 300));
        assert_eq!(bbox.width(), 50);
        assert_eq!(bbox.height(), 100);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::from_xywh(10, 10, 50, 50);
        let b = BoundingBox::from_xywh(30, 30, 50, 50);
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);

        assert!((a.iou(&a) - 1.0).abs() < 0.001);

        let far = BoundingBox::from_xywh(100, 100, 50, 50);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_detection_deserialize_without_class_id() {
        let json = r#"{"class":"person","confidence":0.9,"bbox":{"x1":1,"y1":2,"x2":3,"y2":4}}"#;
        let detection: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(detection.class_id, None);
        assert_eq!(detection.bbox, BoundingBox::new(1, 2, 3, 4));
    }
}
