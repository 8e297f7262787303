use std::path::Path;
use std::time::Duration;

use hound::WavReader;

use crate::error::AppError;

/// Duration of a WAV file in seconds, from its header alone.
pub fn wav_duration(path: &Path) -> Result<f64, AppError> {
    let reader = WavReader::open(path)
        .map_err(|e| AppError::upstream(format!("Invalid WAV output: {}", e)))?;

    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Ok(0.0);
    }

    Ok(reader.duration() as f64 / rate as f64)
}

/// Processing time over audio duration; zero for silent (empty) output.
pub fn real_time_factor(processing: Duration, audio_secs: f64) -> f64 {
    if audio_secs > 0.0 {
        processing.as_secs_f64() / audio_secs
    } else {
        0.0
    }
}
