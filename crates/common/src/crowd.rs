//! Crowd detection contracts for the HTTP API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary crowd classification for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Crowd")]
    Crowd,
    #[serde(rename = "No Crowd")]
    NoCrowd,
}

impl Verdict {
    pub fn is_crowd(self) -> bool {
        matches!(self, Verdict::Crowd)
    }

    /// Label used on the wire and on annotated images
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Crowd => "Crowd",
            Verdict::NoCrowd => "No Crowd",
        }
    }

    /// Lowercase form for metric labels
    pub fn metric_label(self) -> &'static str {
        match self {
            Verdict::Crowd => "crowd",
            Verdict::NoCrowd => "no_crowd",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to classify an image held in object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdDetectRequest {
    /// Bucket holding the source image
    pub bucket: String,

    /// Object key of the source image
    pub file: String,
}

/// Response to a crowd detection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdDetectResponse {
    pub crowd_status: Verdict,

    /// Base64 JPEG of the annotated image, absent when annotation failed
    pub processed_image: Option<String>,

    /// Key the annotated image was uploaded to, null when nothing was stored
    #[serde(default)]
    pub processed_key: Option<String>,

    #[serde(default)]
    pub person_count: usize,

    #[serde(default)]
    pub cluster_count: usize,
}

/// A short sequence of frames to classify independently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSequenceRequest {
    /// Base64 encoded frames in capture order
    pub frames: Vec<String>,

    /// Process every Nth frame (default: 1)
    #[serde(default = "default_frame_interval")]
    pub frame_interval: u32,

    /// Return the annotated image for each processed frame
    #[serde(default)]
    pub include_images: bool,
}

fn default_frame_interval() -> u32 {
    1
}

/// Verdict for one frame of a sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVerdict {
    /// Index of the frame in the submitted sequence
    pub index: usize,

    pub crowd_status: Verdict,

    pub person_count: usize,

    pub cluster_count: usize,

    /// False when the frame could not be decoded as an image
    pub decoded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
}

/// Response for a frame sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSequenceResponse {
    /// Crowd when any processed frame is a crowd
    pub crowd_status: Verdict,

    pub crowd_frames: usize,

    pub frames: Vec<FrameVerdict>,
}
