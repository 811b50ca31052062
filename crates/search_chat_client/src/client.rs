//! HTTP client: send a query, consume the streamed response (status, sources,
//! tokens, done/error frames) and dispatch events in arrival order.

use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decoder::FrameDecoder;
use crate::messages::{dispatch, Dispatch, StreamCallbacks};

/// Client for the search backend. Cheap to clone; one instance is shared by
/// every generation of a conversation.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

/// Client request error. Only failures to establish a stream reach the
/// caller; everything after the body starts flows through `on_error`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Client {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(base_url, reqwest::Client::new())
    }

    /// Create a client with a shared HTTP client.
    pub fn with_http(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Perform one streaming search query.
    ///
    /// `session_id` resumes an existing session when present. Events are
    /// delivered to `callbacks` in arrival order until a terminal frame, end
    /// of stream, or cancellation. Cancellation aborts the read silently.
    pub async fn search_stream(
        &self,
        query: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
        callbacks: &mut StreamCallbacks,
    ) -> Result<(), ClientError> {
        let mut body = json!({ "query": query });
        if let Some(id) = session_id {
            body["sessionId"] = json!(id);
        }

        debug!(session_id, "sending search request");
        let response = self
            .http
            .post(self.endpoint("/api/search"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("stream read cancelled");
                    return Ok(());
                }
                chunk = stream.next() => chunk,
            };

            let chunk = match chunk {
                Some(Ok(chunk)) => chunk,
                Some(Err(error)) => {
                    // Mid-stream transport drop: terminal, not a caller error.
                    deliver_error(callbacks, &format!("stream interrupted: {error}"));
                    return Ok(());
                }
                None => break,
            };

            for frame in decoder.push(&chunk) {
                if dispatch(&frame, callbacks) == Dispatch::Terminal {
                    return Ok(());
                }
            }
        }

        // The body closed without a done/error frame; leftover buffered
        // bytes are discarded.
        debug!(pending = decoder.pending(), "stream ended without terminal frame");
        deliver_error(callbacks, "stream closed before completion");
        Ok(())
    }
}

fn deliver_error(callbacks: &mut StreamCallbacks, message: &str) {
    if let Some(handler) = callbacks.on_error.as_mut() {
        handler(message);
    }
}
