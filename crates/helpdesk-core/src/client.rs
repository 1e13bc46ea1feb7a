use std::pin::pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::state::{AskRequest, ChatUpdate};
use crate::stream::{EventDecoder, StreamEvent};

const EVENT_STREAM: &str = "text/event-stream";

/// Non-streamed answer document
#[derive(Deserialize)]
struct AskResponse {
    response: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Clone)]
pub struct HelpdeskClient {
    client: Client,
    endpoint: String,
}

impl HelpdeskClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn from_config(config: &Config, endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs()))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one turn, reporting every state change through `on_update`.
    ///
    /// Always ends with a terminal update: `Reply`, `Finished` or `Failed`.
    pub async fn run_turn(&self, request: &AskRequest, mut on_update: impl FnMut(ChatUpdate)) {
        if let Err(error) = self.ask(request, &mut on_update).await {
            let message = format!("{error:#}");
            tracing::error!(error = %message, "helpdesk turn failed");
            on_update(ChatUpdate::Failed(message));
        }
    }

    /// Send a question and dispatch the response by its declared content type.
    ///
    /// Transport failures come back as `Err`; an `error` event in the stream is
    /// reported as `ChatUpdate::Failed` and returns `Ok`.
    pub async fn ask<F>(&self, request: &AskRequest, on_update: &mut F) -> Result<()>
    where
        F: FnMut(ChatUpdate),
    {
        tracing::debug!(
            endpoint = %self.endpoint,
            history = request.messages.len(),
            "sending question"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Could not reach {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Helpdesk request failed with status {}: {}", status, text));
        }

        let streaming = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(EVENT_STREAM));

        if streaming {
            consume_stream(response.bytes_stream(), on_update).await
        } else {
            let reply: AskResponse = response
                .json()
                .await
                .context("Helpdesk returned an invalid JSON response")?;
            tracing::debug!(source = ?reply.source, score = ?reply.score, "received reply");
            on_update(ChatUpdate::Reply {
                content: reply.response,
                source: reply.source,
            });
            Ok(())
        }
    }
}

/// Drive a chunked event-stream body into conversation updates.
///
/// Emits `StreamStarted` before reading anything, one `Chunk` per chunk event in
/// wire order, and `Finished` once the body is exhausted. Stops at the first
/// `error` event.
pub async fn consume_stream<S, B, E, F>(stream: S, on_update: &mut F) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<anyhow::Error>,
    F: FnMut(ChatUpdate),
{
    let mut stream = pin!(stream);
    let mut decoder = EventDecoder::new();
    on_update(ChatUpdate::StreamStarted);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(Into::into)
            .context("Response stream interrupted")?;

        for event in decoder.push(chunk.as_ref()) {
            match event {
                StreamEvent::Start { source } => {
                    if let Some(source) = source {
                        on_update(ChatUpdate::Source(source));
                    }
                }
                StreamEvent::Chunk { content } => on_update(ChatUpdate::Chunk(content)),
                StreamEvent::End => tracing::debug!("stream reported end"),
                StreamEvent::Error { message } => {
                    let message = message
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| "The helpdesk reported an error".to_string());
                    tracing::warn!(%message, "stream reported error");
                    on_update(ChatUpdate::Failed(message));
                    return Ok(());
                }
            }
        }
    }

    decoder.finish();
    on_update(ChatUpdate::Finished);
    Ok(())
}
