//! In-process stand-in for the hosted model.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};

use super::{ScratchDir, ScratchFile, SynthesisRequest, Synthesizer};
use crate::error::AppError;

pub const SAMPLE_RATE: u32 = 24000;

#[derive(Debug, Clone, Copy)]
pub enum FakeBehavior {
    /// Half a second of silence.
    Succeed,
    /// Bytes that are not a WAV file.
    Garbage,
    Fail,
    Hang,
}

pub struct FakeSynthesizer {
    scratch: ScratchDir,
    behavior: FakeBehavior,
    requests: Mutex<Vec<SynthesisRequest>>,
    reference_bytes: Mutex<Vec<Vec<u8>>>,
}

impl FakeSynthesizer {
    pub fn new(scratch: ScratchDir, behavior: FakeBehavior) -> Self {
        Self {
            scratch,
            behavior,
            requests: Mutex::new(Vec::new()),
            reference_bytes: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Contents of the reference audio as seen during each call.
    pub fn reference_bytes(&self) -> Vec<Vec<u8>> {
        self.reference_bytes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ScratchFile, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Ok(bytes) = std::fs::read(&request.reference_audio) {
            self.reference_bytes.lock().unwrap().push(bytes);
        }

        let output = self.scratch.reserve("output");
        match self.behavior {
            FakeBehavior::Succeed => {
                let spec = WavSpec {
                    channels: 1,
                    sample_rate: SAMPLE_RATE,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                };
                let mut writer = WavWriter::create(output.path(), spec)
                    .map_err(|e| AppError::upstream(e.to_string()))?;
                for _ in 0..SAMPLE_RATE / 2 {
                    writer
                        .write_sample(0i16)
                        .map_err(|e| AppError::upstream(e.to_string()))?;
                }
                writer
                    .finalize()
                    .map_err(|e| AppError::upstream(e.to_string()))?;
                Ok(output)
            }
            FakeBehavior::Garbage => {
                std::fs::write(output.path(), b"<html>queue full</html>")?;
                Ok(output)
            }
            FakeBehavior::Fail => Err(AppError::upstream("space is sleeping")),
            FakeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(output)
            }
        }
    }
}
