use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("density estimation needs at least 2 centroids, got {0}")]
    InsufficientPoints(usize),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("invalid font data: {0}")]
    Font(String),
}
