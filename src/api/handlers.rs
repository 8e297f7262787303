use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::{HealthResponse, TtsRequest, ENDPOINTS};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::{ScratchFile, SpeechOptions};

pub async fn tts(
    State(state): State<Arc<AppState>>,
    request: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = request.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(format!(
                "Request body exceeds the {} byte limit",
                state.max_upload_bytes
            ))
        } else {
            AppError::Validation(e.body_text())
        }
    })?;

    // Validate input
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("No text provided".into()));
    }

    let output = state
        .tts
        .speak(
            &request.text,
            SpeechOptions {
                speed: request.speed,
                remove_silence: request.remove_silence,
            },
        )
        .await?;

    wav_response(output, "speech.wav").await
}

pub async fn tts_custom(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;

    let mut ref_audio: Option<Bytes> = None;
    let mut ref_text = String::new();
    let mut gen_text = String::new();
    let mut speed = 1.0;
    let mut remove_silence = true;

    let limit = state.max_upload_bytes;
    let malformed = move |e: MultipartError| form_error(e, limit);

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            // Only a file part counts as the reference voice
            "ref_audio" if field.file_name().is_some() => {
                ref_audio = Some(field.bytes().await.map_err(malformed)?)
            }
            "ref_audio" => tracing::debug!("Ignoring ref_audio sent as a plain field"),
            "ref_text" => ref_text = field.text().await.map_err(malformed)?,
            "gen_text" => gen_text = field.text().await.map_err(malformed)?,
            "speed" => {
                let raw = field.text().await.map_err(malformed)?;
                speed = raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Validation(format!("Invalid speed: '{}'", raw)))?;
            }
            "remove_silence" => {
                remove_silence = field.text().await.map_err(malformed)?.to_lowercase() == "true";
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let ref_audio = ref_audio
        .filter(|audio| !audio.is_empty())
        .ok_or_else(|| AppError::Validation("No reference audio provided".into()))?;

    if gen_text.trim().is_empty() {
        return Err(AppError::Validation("No text to generate".into()));
    }

    let output = state
        .tts
        .clone_voice(
            &ref_audio,
            &ref_text,
            &gen_text,
            SpeechOptions {
                speed,
                remove_silence,
            },
        )
        .await?;

    wav_response(output, "custom_speech.wav").await
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model_name.clone(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

fn form_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
    } else {
        AppError::Validation(format!("Malformed form data: {}", e.body_text()))
    }
}

/// Streams the generated file inline. The scratch guard rides along with the
/// body so the file is removed once the body is done or dropped.
async fn wav_response(output: ScratchFile, filename: &str) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(output.path()).await?;
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _guard = &output;
        chunk
    });

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
