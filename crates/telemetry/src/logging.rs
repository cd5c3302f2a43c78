use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse a format name, falling back to the default
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }

    /// Read `LOG_FORMAT`
    pub fn from_env() -> Self {
        Self::parse(&env::var("LOG_FORMAT").unwrap_or_default())
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub service_name: String,
    pub service_version: String,
    pub node_id: Option<String>,
    /// dev/staging/production
    pub environment: String,
    /// Emit span open/close events
    pub enable_span_events: bool,
    /// Also write JSON logs to a daily rolling file under `log_dir`
    pub log_to_file: bool,
    pub log_dir: Option<String>,
}

impl LogConfig {
    /// Defaults from `LOG_FORMAT`, `SERVICE_VERSION`, `NODE_ID`, `ENVIRONMENT`,
    /// `LOG_SPAN_EVENTS`, `LOG_TO_FILE` and `LOG_DIR`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            node_id: env::var("NODE_ID").ok(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            enable_span_events: env_flag("LOG_SPAN_EVENTS"),
            log_to_file: env_flag("LOG_TO_FILE"),
            log_dir: env::var("LOG_DIR").ok(),
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn file_dir(&self) -> Option<&str> {
        if self.log_to_file {
            self.log_dir.as_deref()
        } else {
            None
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

fn default_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    ["hyper=warn", "tokio=warn", "aws_smithy_runtime=warn", "aws_config=warn", "ort=warn"]
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must be held for the
/// lifetime of the process when file logging is enabled.
pub fn init_structured_logging(config: LogConfig) -> Option<WorkerGuard> {
    let span_events = config.span_events();

    let stdout_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_target(true)
            .with_line_number(true)
            .boxed(),
    };

    let (file_layer, guard) = match config.file_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_span_events(config.span_events())
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(default_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service.name = %config.service_name,
            service.version = %config.service_version,
            node_id = config.node_id.as_deref().unwrap_or("-"),
            environment = %config.environment,
            format = ?config.format,
            file_logging = guard.is_some(),
            "structured logging initialized"
        );
    }

    guard
}
