use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use tts::{GradioClient, ReferenceVoice, ScratchDir, TtsService};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    tracing::info!("F5-TTS Gateway v{}", env!("CARGO_PKG_VERSION"));

    if !config.default_ref_audio.exists() {
        tracing::warn!(
            "Default reference audio {} not found; /tts will fail until it is added",
            config.default_ref_audio.display()
        );
    }

    let scratch = ScratchDir::create(&config.scratch_dir).expect("Failed to create scratch directory");
    tracing::info!("Scratch directory: {}", scratch.path().display());

    // Connect to the hosted model once; every request reuses this client
    let client = GradioClient::connect(&config.upstream, scratch.clone())
        .await
        .expect("Failed to connect to the synthesis service");

    let tts = TtsService::new(
        Arc::new(client),
        scratch,
        ReferenceVoice {
            audio: config.default_ref_audio.clone(),
            text: config.default_ref_text.clone(),
        },
        config.upstream.timeout,
    );

    let state = Arc::new(AppState {
        tts,
        model_name: config.model_name.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let app = create_router(state);

    tracing::info!("Starting server on http://{}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
