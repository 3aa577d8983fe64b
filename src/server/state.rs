use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::detect::Detector;
use crate::settings::Settings;

#[derive(Clone)]
pub struct ServerState {
    pub(crate) detector: Detector,
    /// Bounds concurrent detections; each one is CPU bound.
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) workers: usize,
    pub(crate) max_body_bytes: usize,
}

impl ServerState {
    pub fn new(settings: &Settings) -> Self {
        let workers = settings.server.worker_count();
        Self {
            detector: Detector::new(settings.detector.clone()),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            max_body_bytes: settings.server.max_body_bytes,
        }
    }
}
