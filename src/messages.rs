use serde::{Deserialize, Serialize};

use crate::model::Detection;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NarrationResponse {
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Name to fetch from `/audio/{name}`, `null` when speech failed.
    pub audio_file: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}
