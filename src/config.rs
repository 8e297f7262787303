use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Where the hosted model lives and how to reach it.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Either a Hugging Face Space id (`owner/name`) or a full app URL.
    pub space: String,
    pub api_name: String,
    pub hf_endpoint: String,
    pub hf_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub scratch_dir: PathBuf,
    pub default_ref_audio: PathBuf,
    pub default_ref_text: String,
    pub model_name: String,
    pub max_upload_bytes: usize,
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port: u16 = parse("PORT", var("PORT", "5000"))?;
        let addr = parse("HOST", format!("{}:{}", host, port))?;

        let timeout_secs: u64 = parse("UPSTREAM_TIMEOUT_SECS", var("UPSTREAM_TIMEOUT_SECS", "300"))?;
        let max_upload_bytes = parse("MAX_UPLOAD_BYTES", var("MAX_UPLOAD_BYTES", "26214400"))?;

        Ok(Self {
            addr,
            scratch_dir: var("SCRATCH_DIR", "audio_cache").into(),
            default_ref_audio: var("DEFAULT_REF_AUDIO", "ref_audio.wav").into(),
            default_ref_text: var("DEFAULT_REF_TEXT", "Xin chào, tôi là trợ lý ảo của bạn."),
            model_name: var("MODEL_NAME", "F5-TTS Vietnamese V2"),
            max_upload_bytes,
            upstream: UpstreamConfig {
                space: var("GRADIO_SPACE", "coutMinh/f5tts-vietnamese-v2"),
                api_name: var("GRADIO_API_NAME", "/generate_speech"),
                hf_endpoint: var("HF_ENDPOINT", "https://huggingface.co"),
                hf_token: lookup("HF_TOKEN").filter(|t| !t.is_empty()),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
