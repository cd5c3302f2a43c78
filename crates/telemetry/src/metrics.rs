use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Classification ====
    pub static ref CROWD_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_frames_processed_total",
                "Total number of frames classified",
            ),
            &["verdict"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_PERSONS_DETECTED: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "crowd_persons_detected",
                "Accepted person detections per frame",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_CLUSTERS_FOUND: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new("crowd_clusters_found", "Dense clusters found per frame")
                .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_PIPELINE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "crowd_pipeline_latency_seconds",
                "Time spent in each pipeline stage",
            ),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_ANNOTATION_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "crowd_annotation_failures_total",
            "Frames whose verdict was returned without an annotated image",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Detector ====
    pub static ref CROWD_DETECTOR_INFERENCE: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_detector_inference_total",
                "Total number of detector inference runs",
            ),
            &["detector", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CROWD_DETECTOR_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "crowd_detector_inference_seconds",
                "Detector inference time",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["detector", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Object storage ====
    pub static ref CROWD_STORAGE_OPERATIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "crowd_storage_operations_total",
                "Total number of object storage operations",
            ),
            &["operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render the registry in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counter_by_verdict() {
        let before = CROWD_FRAMES_PROCESSED.with_label_values(&["crowd"]).get();
        CROWD_FRAMES_PROCESSED.with_label_values(&["crowd"]).inc();
        assert_eq!(
            CROWD_FRAMES_PROCESSED.with_label_values(&["crowd"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_encoded_output_contains_crowd_metrics() {
        CROWD_STORAGE_OPERATIONS
            .with_label_values(&["get", "success"])
            .inc();
        CROWD_PERSONS_DETECTED.observe(4.0);

        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("crowd_storage_operations_total"));
        assert!(encoded.contains("crowd_persons_detected"));
    }
}
