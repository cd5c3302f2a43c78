//! YOLOv8 person detection using ONNX Runtime
use super::PersonDetector;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use common::detections::{BoundingBox, Detection};
use image::DynamicImage;
use ndarray::{Array, ArrayViewD, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

const DETECTOR_ID: &str = "yolov8";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    pub model_path: String,

    /// Minimum class score for a prediction to be kept
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Square model input size
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    #[serde(default = "default_coco_classes")]
    pub class_names: Vec<String>,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_confidence() -> f32 {
    0.3
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    300
}

fn default_input_size() -> u32 {
    640
}

fn default_coco_classes() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            class_names: default_coco_classes(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

/// Raw prediction after thresholding, in source-image pixels
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    bbox: BoundingBox,
    score: f32,
    class_id: usize,
}

/// YOLOv8 detector.
///
/// The session is created once at load; inference needs `&mut Session`, so
/// concurrent calls serialize on the mutex.
pub struct YoloV8Detector {
    config: Arc<YoloV8Config>,
    session: Arc<Mutex<Session>>,
    execution_provider: &'static str,
}

impl YoloV8Detector {
    /// Load the model, falling back TensorRT → CUDA → CPU from the
    /// configured preference
    pub fn load(config: YoloV8Config) -> Result<Self> {
        if !Path::new(&config.model_path).exists() {
            bail!("YOLOv8 model not found at {}", config.model_path);
        }

        let attempts: &[&'static str] = match config.execution_provider.to_uppercase().as_str() {
            "TENSORRT" => &["TensorRT", "CUDA", "CPU"],
            "CUDA" => &["CUDA", "CPU"],
            _ => &["CPU"],
        };

        let mut last_error = None;
        for &provider in attempts {
            info!(provider, device_id = config.device_id, "configuring YOLOv8 execution provider");
            match build_session(&config, provider) {
                Ok(session) => {
                    info!(
                        model = %config.model_path,
                        provider,
                        device_id = config.device_id,
                        confidence = config.confidence_threshold,
                        input_size = config.input_size,
                        "initialized YOLOv8 detector"
                    );
                    return Ok(Self {
                        config: Arc::new(config),
                        session: Arc::new(Mutex::new(session)),
                        execution_provider: provider,
                    });
                }
                Err(e) => {
                    warn!(provider, error = %e, "execution provider unavailable, falling back");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("no execution provider could be configured")))
    }

    pub fn config(&self) -> &YoloV8Config {
        &self.config
    }

    pub fn execution_provider(&self) -> &'static str {
        self.execution_provider
    }
}

fn build_session(config: &YoloV8Config, provider: &str) -> Result<Session> {
    let providers: Vec<ExecutionProviderDispatch> = match provider {
        "TensorRT" => vec![
            TensorRTExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ],
        "CUDA" => vec![
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ],
        _ => vec![CPUExecutionProvider::default().build()],
    };

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?
        .with_inter_threads(config.inter_threads)?
        .with_execution_providers(providers)?
        .commit_from_file(&config.model_path)?;
    Ok(session)
}

/// Resize to the square model input and lay out as normalized NCHW
fn preprocess(image: &DynamicImage, size: u32) -> Array<f32, IxDyn> {
    let resized = image
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
        input[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
        input[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
    }
    input
}

/// Decode `[1, 4 + classes, predictions]` output into thresholded candidates
/// scaled back to the source image
fn decode_predictions(
    output: ArrayViewD<'_, f32>,
    source_size: (u32, u32),
    config: &YoloV8Config,
) -> Result<Vec<Candidate>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        bail!("unexpected YOLOv8 output shape {:?}", shape);
    }
    let num_classes = shape[1] - 4;
    let num_predictions = shape[2];

    let (width, height) = (source_size.0 as f32, source_size.1 as f32);
    let scale_x = width / config.input_size as f32;
    let scale_y = height / config.input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..num_predictions {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < config.confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let bbox = BoundingBox::new(
            ((cx - w / 2.0) * scale_x).clamp(0.0, width).round() as i32,
            ((cy - h / 2.0) * scale_y).clamp(0.0, height).round() as i32,
            ((cx + w / 2.0) * scale_x).clamp(0.0, width).round() as i32,
            ((cy + h / 2.0) * scale_y).clamp(0.0, height).round() as i32,
        );
        candidates.push(Candidate {
            bbox,
            score,
            class_id,
        });
    }

    Ok(candidates)
}

/// Greedy per-class NMS, highest score first
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

fn to_detections(candidates: Vec<Candidate>, config: &YoloV8Config) -> Vec<Detection> {
    candidates
        .into_iter()
        .take(config.max_detections)
        .map(|c| Detection {
            class: config
                .class_names
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", c.class_id)),
            class_id: Some(c.class_id as u32),
            confidence: c.score,
            bbox: c.bbox,
        })
        .collect()
}

fn run_inference(
    session: &Mutex<Session>,
    config: &YoloV8Config,
    provider: &'static str,
    image: &DynamicImage,
) -> Result<Vec<Detection>> {
    let source_size = (image.width(), image.height());
    let input_tensor = Value::from_array(preprocess(image, config.input_size))?;

    let inference_start = Instant::now();
    let output = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let output_value = outputs.get("output0").context("No output tensor found")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        Array::from_shape_vec(IxDyn(&shape), data.to_vec())?
    };
    let inference_time = inference_start.elapsed();

    telemetry::metrics::CROWD_DETECTOR_INFERENCE
        .with_label_values(&[DETECTOR_ID, provider])
        .inc();
    telemetry::metrics::CROWD_DETECTOR_INFERENCE_TIME
        .with_label_values(&[DETECTOR_ID, provider])
        .observe(inference_time.as_secs_f64());

    let candidates = decode_predictions(output.view(), source_size, config)?;
    let detections = to_detections(non_max_suppression(candidates, config.iou_threshold), config);

    debug!(
        detections = detections.len(),
        inference_ms = inference_time.as_millis() as u64,
        provider,
        "YOLOv8 inference complete"
    );
    Ok(detections)
}

#[async_trait]
impl PersonDetector for YoloV8Detector {
    fn id(&self) -> &'static str {
        DETECTOR_ID
    }

    fn name(&self) -> &'static str {
        "YOLOv8 Object Detector"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let session = Arc::clone(&self.session);
        let config = Arc::clone(&self.config);
        let provider = self.execution_provider;
        let image = image.clone();

        tokio::task::spawn_blocking(move || run_inference(&session, &config, provider, &image))
            .await
            .context("YOLOv8 inference task failed")?
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.session.is_poisoned())
    }
}
