pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod storage;

pub use config::CrowdServiceConfig;
pub use error::ApiError;
pub use pipeline::{CrowdPipeline, FrameOutcome, PipelineError};
pub use state::{CrowdServiceState, RequestLimits};
