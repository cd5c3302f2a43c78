//! Crowd classification: the pure engine and the HTTP service around it.

pub use common;
pub use crowd_engine as engine;
pub use crowd_service as service;
