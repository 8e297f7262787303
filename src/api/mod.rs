pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};

pub const ENDPOINTS: [&str; 2] = ["/tts", "/tts-custom"];

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_remove_silence")]
    pub remove_silence: bool,
}

fn default_speed() -> f32 {
    1.0
}

fn default_remove_silence() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub endpoints: Vec<String>,
}
