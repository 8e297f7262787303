pub mod audio;
pub mod gradio;
pub mod scratch;

#[cfg(test)]
pub mod fake;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::AppError;

pub use gradio::GradioClient;
pub use scratch::{ScratchDir, ScratchFile};

/// Parameters for one call to the hosted model.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub reference_audio: PathBuf,
    pub reference_text: String,
    pub gen_text: String,
    pub speed: f32,
    pub remove_silence: bool,
}

/// The remote model. Returns the generated WAV as a scratch file owned by
/// the caller.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ScratchFile, AppError>;
}

/// Voice used by `/tts` when the caller supplies none.
#[derive(Debug, Clone)]
pub struct ReferenceVoice {
    pub audio: PathBuf,
    pub text: String,
}

pub struct SpeechOptions {
    pub speed: f32,
    pub remove_silence: bool,
}

pub struct TtsService {
    synthesizer: Arc<dyn Synthesizer>,
    scratch: ScratchDir,
    default_voice: ReferenceVoice,
    timeout: Duration,
}

impl TtsService {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        scratch: ScratchDir,
        default_voice: ReferenceVoice,
        timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            scratch,
            default_voice,
            timeout,
        }
    }

    /// Synthesizes `text` with the configured default voice and logs timing.
    pub async fn speak(&self, text: &str, options: SpeechOptions) -> Result<ScratchFile, AppError> {
        tracing::info!(chars = text.chars().count(), "Processing text");
        tracing::debug!(text, "Default voice request");

        let request = SynthesisRequest {
            reference_audio: self.default_voice.audio.clone(),
            reference_text: self.default_voice.text.clone(),
            gen_text: text.to_string(),
            speed: options.speed,
            remove_silence: options.remove_silence,
        };

        let started = Instant::now();
        let output = self.call(&request).await?;
        let processing = started.elapsed();

        let path = output.path().to_path_buf();
        let duration = tokio::task::spawn_blocking(move || audio::wav_duration(&path))
            .await
            .map_err(|e| AppError::upstream(format!("Duration task failed: {}", e)))??;
        let rtf = audio::real_time_factor(processing, duration);

        tracing::info!(
            processing_secs = format_args!("{:.2}", processing.as_secs_f64()),
            audio_secs = format_args!("{:.2}", duration),
            rtf = format_args!("{:.3}", rtf),
            "Synthesis complete"
        );

        Ok(output)
    }

    /// Clones the voice in `reference_audio` to speak `text`. The upload is
    /// kept in scratch only for the duration of the call.
    pub async fn clone_voice(
        &self,
        reference_audio: &[u8],
        reference_text: &str,
        text: &str,
        options: SpeechOptions,
    ) -> Result<ScratchFile, AppError> {
        let reference = self.scratch.persist("temp", reference_audio).await?;

        tracing::info!(
            chars = text.chars().count(),
            reference = %reference.path().display(),
            "Custom voice - Processing text"
        );

        let request = SynthesisRequest {
            reference_audio: reference.path().to_path_buf(),
            reference_text: reference_text.to_string(),
            gen_text: text.to_string(),
            speed: options.speed,
            remove_silence: options.remove_silence,
        };

        let started = Instant::now();
        let result = self.call(&request).await;
        drop(reference);

        tracing::info!(
            processing_secs = format_args!("{:.2}", started.elapsed().as_secs_f64()),
            ok = result.is_ok(),
            "Custom voice synthesis finished"
        );

        result
    }

    async fn call(&self, request: &SynthesisRequest) -> Result<ScratchFile, AppError> {
        tokio::time::timeout(self.timeout, self.synthesizer.synthesize(request))
            .await
            .map_err(|_| AppError::UpstreamTimeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeBehavior, FakeSynthesizer};
    use super::*;

    fn service(dir: &std::path::Path, behavior: FakeBehavior) -> (TtsService, Arc<FakeSynthesizer>) {
        let scratch = ScratchDir::create(dir).unwrap();
        let fake = Arc::new(FakeSynthesizer::new(scratch.clone(), behavior));
        let voice = ReferenceVoice {
            audio: PathBuf::from("ref_audio.wav"),
            text: "Xin chào".to_string(),
        };
        let service = TtsService::new(fake.clone(), scratch, voice, Duration::from_millis(200));
        (service, fake)
    }

    fn options() -> SpeechOptions {
        SpeechOptions {
            speed: 1.25,
            remove_silence: false,
        }
    }

    #[tokio::test]
    async fn speak_uses_default_voice() {
        let dir = tempfile::tempdir().unwrap();
        let (service, fake) = service(dir.path(), FakeBehavior::Succeed);

        let output = service.speak("hello", options()).await.unwrap();
        assert!(output.path().exists());

        let seen = fake.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].reference_audio, PathBuf::from("ref_audio.wav"));
        assert_eq!(seen[0].reference_text, "Xin chào");
        assert_eq!(seen[0].gen_text, "hello");
        assert_eq!(seen[0].speed, 1.25);
        assert!(!seen[0].remove_silence);
    }

    #[tokio::test]
    async fn speak_rejects_invalid_output() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeBehavior::Garbage);

        let err = service.speak("hello", options()).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn clone_voice_passes_upload_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (service, fake) = service(dir.path(), FakeBehavior::Succeed);

        let output = service
            .clone_voice(b"RIFF-upload", "ref words", "new words", options())
            .await
            .unwrap();

        let seen = fake.requests();
        assert_eq!(seen[0].reference_text, "ref words");
        assert_eq!(fake.reference_bytes(), vec![b"RIFF-upload".to_vec()]);
        assert!(!seen[0].reference_audio.exists());

        drop(output);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clone_voice_cleans_up_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (service, fake) = service(dir.path(), FakeBehavior::Fail);

        let err = service
            .clone_voice(b"RIFF", "", "words", options())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(fake.reference_bytes().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), FakeBehavior::Hang);

        let err = service
            .clone_voice(b"RIFF", "", "words", options())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamTimeout(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
