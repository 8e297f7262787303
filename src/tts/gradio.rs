//! Client for a Gradio app hosting the model, speaking the same HTTP API as
//! the Python `gradio_client`: upload, queue a call, follow its event stream,
//! then fetch the output file.

use std::path::Path;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use super::{ScratchDir, ScratchFile, SynthesisRequest, Synthesizer};
use crate::config::UpstreamConfig;
use crate::error::AppError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GradioClient {
    http: Client,
    root: String,
    api_prefix: String,
    api_name: String,
    token: Option<String>,
    scratch: ScratchDir,
}

#[derive(Debug, Deserialize)]
struct SpaceHost {
    host: String,
}

#[derive(Debug, Deserialize)]
struct AppInfo {
    #[serde(default)]
    api_prefix: String,
}

#[derive(Debug, Deserialize)]
struct QueuedCall {
    event_id: String,
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    path: &'a str,
    orig_name: &'a str,
    meta: FileMeta,
}

#[derive(Debug, Serialize)]
struct FileMeta {
    #[serde(rename = "_type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum OutputFile {
    Data {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        path: Option<String>,
    },
    Path(String),
}

impl GradioClient {
    /// Resolves the app root and probes its config once, at startup.
    pub async fn connect(config: &UpstreamConfig, scratch: ScratchDir) -> Result<Self, AppError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        let mut client = Self {
            http,
            root: String::new(),
            api_prefix: String::new(),
            api_name: config.api_name.trim_matches('/').to_string(),
            token: config.hf_token.clone(),
            scratch,
        };

        client.root = client.resolve_root(&config.space, &config.hf_endpoint).await?;

        let info: AppInfo = client
            .send_json(client.http.get(format!("{}/config", client.root)), "config")
            .await?;
        client.api_prefix = info.api_prefix.trim_end_matches('/').to_string();

        tracing::info!(
            root = %client.root,
            api_prefix = %client.api_prefix,
            api_name = %client.api_name,
            "Connected to Gradio app"
        );

        Ok(client)
    }

    async fn resolve_root(&self, space: &str, hf_endpoint: &str) -> Result<String, AppError> {
        if space.contains("://") {
            return Ok(space.trim_end_matches('/').to_string());
        }

        let url = format!(
            "{}/api/spaces/{}/host",
            hf_endpoint.trim_end_matches('/'),
            space
        );
        let host: SpaceHost = self.send_json(self.http.get(url), "space lookup").await?;
        tracing::debug!(space, host = %host.host, "Resolved Hugging Face Space");

        Ok(host.host.trim_end_matches('/').to_string())
    }

    fn endpoint(&self, tail: &str) -> String {
        format!("{}{}/{}", self.root, self.api_prefix, tail)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Whether `url` points at the app itself, as opposed to a file host
    /// the app redirected us to.
    fn is_own(&self, url: &str) -> bool {
        url.strip_prefix(self.root.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, AppError> {
        self.dispatch(self.authorized(builder), what).await
    }

    async fn dispatch(&self, builder: RequestBuilder, what: &str) -> Result<Response, AppError> {
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::upstream(format!(
            "{} returned {}: {}",
            what, status, body
        )))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, AppError> {
        self.send(builder, what)
            .await?
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("{} returned an invalid body: {}", what, e)))
    }

    /// Uploads a local file, returning its server-side path.
    async fn upload(&self, path: &Path, name: &str) -> Result<String, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("audio/wav")?;
        let form = multipart::Form::new().part("files", part);

        let paths: Vec<String> = self
            .send_json(self.http.post(self.endpoint("upload")).multipart(form), "upload")
            .await?;

        paths
            .into_iter()
            .next()
            .ok_or_else(|| AppError::upstream("upload returned no paths"))
    }

    async fn submit(
        &self,
        uploaded: &str,
        name: &str,
        request: &SynthesisRequest,
    ) -> Result<String, AppError> {
        let reference = FileData {
            path: uploaded,
            orig_name: name,
            meta: FileMeta {
                kind: "gradio.FileData",
            },
        };
        let body = json!({
            "data": [
                reference,
                request.reference_text,
                request.gen_text,
                request.speed,
                request.remove_silence,
            ]
        });

        let url = self.endpoint(&format!("call/{}", self.api_name));
        let queued: QueuedCall = self.send_json(self.http.post(url).json(&body), "call").await?;

        Ok(queued.event_id)
    }

    /// Follows the call's event stream until it completes or fails.
    async fn await_output(&self, event_id: &str) -> Result<OutputFile, AppError> {
        let url = self.endpoint(&format!("call/{}/{}", self.api_name, event_id));
        let response = self.send(self.http.get(url), "result stream").await?;

        let mut events = pin!(response.bytes_stream().eventsource());
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| AppError::upstream(format!("result stream broke: {}", e)))?;

            match event.event.as_str() {
                "complete" => return parse_output(&event.data),
                "error" => {
                    return Err(AppError::upstream(format!(
                        "model reported an error: {}",
                        error_message(&event.data)
                    )))
                }
                other => tracing::trace!(event = other, "Skipping Gradio event"),
            }
        }

        Err(AppError::upstream("result stream ended before completion"))
    }

    fn download_url(&self, output: OutputFile) -> Result<String, AppError> {
        match output {
            OutputFile::Data { url: Some(url), .. } if url.starts_with('/') => {
                Ok(format!("{}{}", self.root, url))
            }
            OutputFile::Data { url: Some(url), .. } => Ok(url),
            OutputFile::Data {
                path: Some(path), ..
            }
            | OutputFile::Path(path) => Ok(self.endpoint(&format!("file={}", path))),
            OutputFile::Data { .. } => Err(AppError::upstream("output has neither url nor path")),
        }
    }

    async fn download(&self, url: &str) -> Result<ScratchFile, AppError> {
        // The token only goes to the app; output urls may name another host
        let builder = self.http.get(url);
        let mut response = if self.is_own(url) {
            self.send(builder, "download").await?
        } else {
            self.dispatch(builder, "download").await?
        };

        let output = self.scratch.reserve("output");
        let mut file = tokio::fs::File::create(output.path()).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(output)
    }
}

#[async_trait]
impl Synthesizer for GradioClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ScratchFile, AppError> {
        let name = request
            .reference_audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference.wav".to_string());

        let uploaded = self.upload(&request.reference_audio, &name).await?;
        let event_id = self.submit(&uploaded, &name, request).await?;
        tracing::debug!(event_id = %event_id, "Synthesis queued");

        let output = self.await_output(&event_id).await?;
        let url = self.download_url(output)?;
        self.download(&url).await
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout(CONNECT_TIMEOUT)
    } else {
        AppError::upstream(format!("{} request failed: {}", what, e))
    }
}

fn parse_output(data: &str) -> Result<OutputFile, AppError> {
    let outputs: Vec<Value> = serde_json::from_str(data)
        .map_err(|e| AppError::upstream(format!("malformed completion payload: {}", e)))?;

    let first = outputs
        .into_iter()
        .next()
        .ok_or_else(|| AppError::upstream("completion carried no outputs"))?;

    serde_json::from_value(first)
        .map_err(|e| AppError::upstream(format!("output is not a file: {}", e)))
}

fn error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(message)) => message,
        Ok(Value::Null) => "no details".to_string(),
        _ if data.trim().is_empty() => "no details".to_string(),
        _ => data.to_string(),
    }
}
