//! Rendering of crowd assessments onto the source image.

use crate::classifier::CrowdAssessment;
use crate::config::AnnotationStyle;
use crate::error::AnnotationError;
use ab_glyph::FontArc;
use common::crowd::Verdict;
use common::detections::BoundingBox;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::fmt;
use tracing::warn;

const LABEL_PADDING: i32 = 6;

/// DejaVu Sans, used for the verdict label unless another font is supplied.
/// License: assets/DejaVuSans-LICENSE.txt
pub const DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws person boxes, cluster markers and the verdict label
#[derive(Clone)]
pub struct Annotator {
    style: AnnotationStyle,
    font: Option<FontArc>,
}

impl fmt::Debug for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotator")
            .field("style", &self.style)
            .field("font_loaded", &self.font.is_some())
            .finish()
    }
}

impl Annotator {
    /// Annotator with the bundled label font
    pub fn new(style: AnnotationStyle) -> Self {
        let font = match FontArc::try_from_slice(DEFAULT_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!(error = %e, "bundled label font unreadable, drawing banner only");
                None
            }
        };
        Self { style, font }
    }

    /// Replace the label font with a TrueType/OpenType face
    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self, AnnotationError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| AnnotationError::Font(e.to_string()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Render and encode as JPEG
    pub fn annotate(
        &self,
        image: &DynamicImage,
        assessment: &CrowdAssessment,
    ) -> Result<Vec<u8>, AnnotationError> {
        let canvas = self.render(image, assessment);
        self.encode_jpeg(&canvas)
    }

    pub fn render(&self, image: &DynamicImage, assessment: &CrowdAssessment) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();
        let margin = self.style.box_thickness.max(1) as i32 + 1;

        for detection in &assessment.extraction.accepted {
            if let Some((x, y, w, h)) = visible_box(&detection.bbox, width, height, margin) {
                self.draw_box(&mut canvas, x, y, w, h);
            }
        }

        if let Some(assignment) = &assessment.assignment {
            let color = Rgb(self.style.marker_color);
            let radius = self.style.marker_radius.max(0);
            for index in assignment.clustered_indices() {
                let Some(centroid) = assessment.extraction.centroids.get(index) else {
                    continue;
                };
                if within_reach(centroid.x, width, radius) && within_reach(centroid.y, height, radius)
                {
                    draw_filled_circle_mut(
                        &mut canvas,
                        (centroid.x, centroid.y),
                        radius,
                        color,
                    );
                }
            }
        }

        self.draw_label(&mut canvas, assessment.verdict);
        canvas
    }

    pub fn encode_jpeg(&self, canvas: &RgbImage) -> Result<Vec<u8>, AnnotationError> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.style.jpeg_quality);
        encoder.encode_image(canvas)?;
        Ok(buffer)
    }

    fn draw_box(&self, canvas: &mut RgbImage, x: i32, y: i32, width: i32, height: i32) {
        let color = Rgb(self.style.box_color);
        for inset in 0..self.style.box_thickness.max(1) as i32 {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, verdict: Verdict) {
        let text = verdict.as_str();
        let (x, y) = self.style.label_origin;
        let scale = self.style.label_scale.max(1.0);

        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, text),
            // Rough glyph box so the banner width still tracks the label
            None => ((scale * 0.6 * text.len() as f32) as u32, scale as u32),
        };

        let banner_color = match verdict {
            Verdict::Crowd => self.style.crowd_color,
            Verdict::NoCrowd => self.style.no_crowd_color,
        };
        let banner = Rect::at(x - LABEL_PADDING, y - LABEL_PADDING).of_size(
            text_w.max(1) + 2 * LABEL_PADDING as u32,
            text_h.max(1) + 2 * LABEL_PADDING as u32,
        );
        draw_filled_rect_mut(canvas, banner, Rgb(banner_color));

        if let Some(font) = &self.font {
            draw_text_mut(canvas, Rgb(self.style.text_color), x, y, scale, font, text);
        }
    }
}

/// Box limited to the canvas grown by `margin`, as (x, y, width, height).
///
/// Edges beyond the canvas stay outside the visible area, and coordinates
/// far off-canvas never reach the drawing routines.
fn visible_box(
    bbox: &BoundingBox,
    width: u32,
    height: u32,
    margin: i32,
) -> Option<(i32, i32, i32, i32)> {
    let margin = i64::from(margin);
    let x1 = i64::from(bbox.x1).max(-margin);
    let y1 = i64::from(bbox.y1).max(-margin);
    let x2 = i64::from(bbox.x2).min(i64::from(width) + margin);
    let y2 = i64::from(bbox.y2).min(i64::from(height) + margin);
    if x1 >= x2 || y1 >= y2 {
        return None;
    }
    Some((
        i32::try_from(x1).ok()?,
        i32::try_from(y1).ok()?,
        i32::try_from(x2 - x1).ok()?,
        i32::try_from(y2 - y1).ok()?,
    ))
}

/// A marker of `radius` centred at `coord` touches [0, extent)
fn within_reach(coord: i32, extent: u32, radius: i32) -> bool {
    let coord = i64::from(coord);
    let radius = i64::from(radius);
    coord + radius >= 0 && coord - radius < i64::from(extent)
}
