use anyhow::{anyhow, bail, Context, Result};
use crowd_engine::{EngineConfig, Resolution};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_MAX_FRAMES: usize = 64;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Which person detector to load
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorBackend {
    YoloV8 {
        model_path: PathBuf,
        /// Preferred execution provider (CPU, CUDA, TensorRT)
        execution_provider: Option<String>,
        device_id: Option<i32>,
    },
    /// Fixed detections read from a JSON file (empty list when absent)
    Static { path: Option<PathBuf> },
}

/// Connection settings for an S3-compatible store
#[derive(Debug, Clone, PartialEq)]
pub struct S3Settings {
    /// Custom endpoint (MinIO etc.); path-style addressing is used when set
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    S3(S3Settings),
    Memory,
    None,
}

#[derive(Debug, Clone)]
pub struct CrowdServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this service instance
    pub node_id: String,

    pub detector: DetectorBackend,

    pub storage: StorageBackend,

    pub engine: EngineConfig,

    /// TrueType font replacing the bundled verdict label font
    pub font_path: Option<PathBuf>,

    /// Upper bound on request bodies
    pub max_upload_bytes: usize,

    /// Upper bound on frames per sequence request
    pub max_frames: usize,

    pub request_timeout: Duration,
}

impl CrowdServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("CROWD_SERVICE_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let node_id = var("NODE_ID").unwrap_or_else(|| {
            format!(
                "crowd-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let detector = match var("DETECTOR_BACKEND")
            .unwrap_or_else(|| "yolov8".to_string())
            .to_lowercase()
            .as_str()
        {
            "yolov8" | "yolo" => DetectorBackend::YoloV8 {
                model_path: var("YOLOV8_MODEL_PATH")
                    .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string())
                    .into(),
                execution_provider: var("YOLOV8_EXECUTION_PROVIDER"),
                device_id: var("YOLOV8_DEVICE_ID")
                    .map(|v| v.parse::<i32>().context("Invalid YOLOV8_DEVICE_ID"))
                    .transpose()?,
            },
            "static" => DetectorBackend::Static {
                path: var("STATIC_DETECTIONS_PATH").map(PathBuf::from),
            },
            other => bail!("Unknown DETECTOR_BACKEND '{}' (expected yolov8 or static)", other),
        };

        let storage = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "s3".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3(S3Settings {
                endpoint: var("S3_ENDPOINT"),
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key: var("S3_ACCESS_KEY"),
                secret_key: var("S3_SECRET_KEY"),
            }),
            "memory" => StorageBackend::Memory,
            "none" => StorageBackend::None,
            other => bail!("Unknown STORAGE_BACKEND '{}' (expected s3, memory or none)", other),
        };

        let mut engine = match var("CROWD_ENGINE_CONFIG") {
            Some(raw) => {
                serde_json::from_str::<EngineConfig>(&raw).context("Invalid CROWD_ENGINE_CONFIG")?
            }
            None => EngineConfig::default(),
        };
        if let Some(raw) = var("CROWD_WORKING_RESOLUTION") {
            let resolution = parse_resolution(&raw).context("Invalid CROWD_WORKING_RESOLUTION")?;
            engine = engine.with_working_resolution(resolution);
        }
        engine
            .validate()
            .map_err(|e| anyhow!("Invalid engine configuration: {}", e))?;

        let max_upload_bytes = parse_or(var("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)
            .context("Invalid MAX_UPLOAD_BYTES")?;
        let max_frames =
            parse_or(var("MAX_FRAMES"), DEFAULT_MAX_FRAMES).context("Invalid MAX_FRAMES")?;
        let timeout_secs = parse_or(var("REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS)
            .context("Invalid REQUEST_TIMEOUT_SECS")?;

        Ok(Self {
            bind_addr,
            node_id,
            detector,
            storage,
            engine,
            font_path: var("CROWD_FONT_PATH").map(PathBuf::from),
            max_upload_bytes,
            max_frames,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse::<T>()?),
        None => Ok(default),
    }
}

/// Parse `WIDTHxHEIGHT`, e.g. `1920x1080`
pub fn parse_resolution(value: &str) -> Result<Resolution> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = w.trim().parse().context("invalid width")?;
    let height: u32 = h.trim().parse().context("invalid height")?;
    if width == 0 || height == 0 {
        bail!("resolution must be non-zero, got {}x{}", width, height);
    }
    Ok(Resolution::new(width, height))
}
