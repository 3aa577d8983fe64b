use serde::{Deserialize, Serialize};

use crate::detect::DetectionMethod;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DetectRequest {
    /// Image bytes as base64, optionally wrapped in a `data:` URI.
    pub data_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub methods: Vec<DetectionMethod>,
    pub workers: usize,
    pub note: String,
}
