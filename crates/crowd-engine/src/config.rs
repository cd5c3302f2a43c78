use crate::error::EngineError;
use common::detections::{PERSON_CLASS_ID, PERSON_LABEL};
use serde::{Deserialize, Serialize};

/// Pixel dimensions images are normalized to before detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn diagonal(&self) -> f64 {
        f64::from(self.width).hypot(f64::from(self.height))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Inclusive clamp range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

/// RGB colour
pub type Color = [u8; 3];

/// How annotated images are drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    /// Colour of person boxes
    #[serde(default = "default_box_color")]
    pub box_color: Color,

    /// Stroke width of person boxes in pixels
    #[serde(default = "default_box_thickness")]
    pub box_thickness: u32,

    /// Colour of markers over clustered centroids
    #[serde(default = "default_marker_color")]
    pub marker_color: Color,

    /// Radius of cluster markers in pixels
    #[serde(default = "default_marker_radius")]
    pub marker_radius: i32,

    /// Top-left corner of the verdict label
    #[serde(default = "default_label_origin")]
    pub label_origin: (i32, i32),

    /// Text height of the verdict label in pixels
    #[serde(default = "default_label_scale")]
    pub label_scale: f32,

    /// Banner colour behind a Crowd label
    #[serde(default = "default_crowd_color")]
    pub crowd_color: Color,

    /// Banner colour behind a No Crowd label
    #[serde(default = "default_no_crowd_color")]
    pub no_crowd_color: Color,

    /// Colour of the label text
    #[serde(default = "default_text_color")]
    pub text_color: Color,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_box_color() -> Color {
    [0, 255, 0]
}

fn default_box_thickness() -> u32 {
    2
}

fn default_marker_color() -> Color {
    [255, 0, 0]
}

fn default_marker_radius() -> i32 {
    10
}

fn default_label_origin() -> (i32, i32) {
    (50, 50)
}

fn default_label_scale() -> f32 {
    32.0
}

fn default_crowd_color() -> Color {
    [200, 0, 0]
}

fn default_no_crowd_color() -> Color {
    [0, 120, 0]
}

fn default_text_color() -> Color {
    [255, 255, 255]
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: default_box_color(),
            box_thickness: default_box_thickness(),
            marker_color: default_marker_color(),
            marker_radius: default_marker_radius(),
            label_origin: default_label_origin(),
            label_scale: default_label_scale(),
            crowd_color: default_crowd_color(),
            no_crowd_color: default_no_crowd_color(),
            text_color: default_text_color(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Tuning of the adaptive crowd classifier.
///
/// The radius bounds are in pixels of `working_resolution`; use
/// [`EngineConfig::with_working_resolution`] to move them to another
/// resolution instead of editing them by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resolution frames are resized to before detection
    #[serde(default)]
    pub working_resolution: Resolution,

    /// Multiplier applied to the mean pairwise distance to get eps
    #[serde(default = "default_radius_scale")]
    pub radius_scale: f64,

    /// Clamp range for eps
    #[serde(default = "default_radius_bounds")]
    pub radius_bounds: Bounds<f64>,

    /// Population divisor used to derive the minimum neighbor count
    #[serde(default = "default_min_neighbors_divisor")]
    pub min_neighbors_divisor: usize,

    /// Clamp range for the minimum neighbor count
    #[serde(default = "default_min_neighbors_bounds")]
    pub min_neighbors_bounds: Bounds<usize>,

    /// Detections below this confidence are ignored
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Class index that denotes a person
    #[serde(default = "default_person_class_id")]
    pub person_class_id: u32,

    /// Class label that denotes a person (ASCII case-insensitive)
    #[serde(default = "default_person_label")]
    pub person_label: String,

    #[serde(default)]
    pub annotation: AnnotationStyle,
}

fn default_radius_scale() -> f64 {
    1.2
}

fn default_radius_bounds() -> Bounds<f64> {
    Bounds::new(50.0, 150.0)
}

fn default_min_neighbors_divisor() -> usize {
    5
}

fn default_min_neighbors_bounds() -> Bounds<usize> {
    Bounds::new(3, 6)
}

fn default_confidence_threshold() -> f32 {
    0.3
}

fn default_person_class_id() -> u32 {
    PERSON_CLASS_ID
}

fn default_person_label() -> String {
    PERSON_LABEL.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_resolution: Resolution::default(),
            radius_scale: default_radius_scale(),
            radius_bounds: default_radius_bounds(),
            min_neighbors_divisor: default_min_neighbors_divisor(),
            min_neighbors_bounds: default_min_neighbors_bounds(),
            confidence_threshold: default_confidence_threshold(),
            person_class_id: default_person_class_id(),
            person_label: default_person_label(),
            annotation: AnnotationStyle::default(),
        }
    }
}

impl EngineConfig {
    /// Check internal consistency
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.working_resolution.width == 0 || self.working_resolution.height == 0 {
            return Err(EngineError::InvalidConfig(
                "working_resolution must be non-zero".to_string(),
            ));
        }
        if !(self.radius_scale.is_finite() && self.radius_scale > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "radius_scale must be positive, got {}",
                self.radius_scale
            )));
        }
        if !(self.radius_bounds.min.is_finite() && self.radius_bounds.max.is_finite())
            || self.radius_bounds.min < 0.0
            || self.radius_bounds.min > self.radius_bounds.max
        {
            return Err(EngineError::InvalidConfig(format!(
                "radius_bounds must satisfy 0 <= min <= max, got ({}, {})",
                self.radius_bounds.min, self.radius_bounds.max
            )));
        }
        if self.min_neighbors_divisor == 0 {
            return Err(EngineError::InvalidConfig(
                "min_neighbors_divisor must be at least 1".to_string(),
            ));
        }
        if self.min_neighbors_bounds.min > self.min_neighbors_bounds.max {
            return Err(EngineError::InvalidConfig(format!(
                "min_neighbors_bounds must satisfy min <= max, got ({}, {})",
                self.min_neighbors_bounds.min, self.min_neighbors_bounds.max
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(1..=100).contains(&self.annotation.jpeg_quality) {
            return Err(EngineError::InvalidConfig(format!(
                "jpeg_quality must be within [1, 100], got {}",
                self.annotation.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Copy of this config retargeted to another working resolution.
    ///
    /// Radius bounds scale with the ratio of the image diagonals.
    pub fn with_working_resolution(&self, resolution: Resolution) -> Self {
        let mut config = self.clone();
        let current = self.working_resolution.diagonal();
        if current > 0.0 {
            let ratio = resolution.diagonal() / current;
            config.radius_bounds = Bounds::new(
                self.radius_bounds.min * ratio,
                self.radius_bounds.max * ratio,
            );
        }
        config.working_resolution = resolution;
        config
    }
}
