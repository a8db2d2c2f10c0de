//! JSON-RPC over an SSE event stream plus HTTP POST.
//!
//! The provider holds open a streaming GET; its first event announces
//! the endpoint requests should be POSTed to, and responses arrive as
//! `message` events on the stream. The two directions are separate
//! connections and can fail independently, which is where aggregate
//! failures come from.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::Mutex;
use url::Url;

use super::SessionError;
use crate::protocol::JsonRpcResponse;

/// After a failed POST, how long to wait for the stream side to report
/// its own failure before giving up on pairing the two.
const STREAM_FAILURE_WINDOW: Duration = Duration::from_millis(250);

pub(super) struct SseTransport {
    client: reqwest::Client,
    message_url: Url,
    events: Mutex<EventStream>,
}

impl SseTransport {
    /// Establish the streaming connection and wait for the provider to
    /// announce its message endpoint.
    pub(super) async fn connect(
        client: reqwest::Client,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self, SessionError> {
        let request = stream_request(&client, url, headers);
        let response = request.send().await.map_err(|e| SessionError::Request {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut events = EventStream::new(response.bytes_stream());
        let endpoint = loop {
            let Some(event) = events.next_event().await? else {
                return Err(SessionError::Closed(
                    "event stream ended before the endpoint announcement".to_string(),
                ));
            };
            if event.name == "endpoint" {
                break event.data;
            }
            tracing::debug!(event = %event.name, "Ignoring pre-endpoint event");
        };

        let base = Url::parse(url)
            .map_err(|e| SessionError::Protocol(format!("invalid endpoint URL {url}: {e}")))?;
        let message_url = base.join(endpoint.trim()).map_err(|e| {
            SessionError::Protocol(format!("invalid message endpoint '{endpoint}': {e}"))
        })?;
        tracing::debug!(message_url = %message_url, "SSE transport connected");

        Ok(Self {
            client,
            message_url,
            events: Mutex::new(events),
        })
    }

    pub(super) async fn round_trip(
        &self,
        id: u64,
        payload: String,
    ) -> Result<JsonRpcResponse, SessionError> {
        if let Err(post_err) = self.post_message(payload).await {
            // The response can no longer arrive; check whether the
            // stream side failed too so neither cause is lost.
            match tokio::time::timeout(STREAM_FAILURE_WINDOW, self.recv_response(id)).await {
                Ok(Err(stream_err)) => {
                    return Err(SessionError::Aggregate(vec![post_err, stream_err]));
                }
                _ => return Err(post_err),
            }
        }
        self.recv_response(id).await
    }

    pub(super) async fn send_notification(&self, payload: String) -> Result<(), SessionError> {
        self.post_message(payload).await
    }

    async fn post_message(&self, payload: String) -> Result<(), SessionError> {
        let response = self
            .client
            .post(self.message_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| SessionError::Request {
                url: self.message_url.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Http {
                status: status.as_u16(),
                url: self.message_url.to_string(),
            });
        }
        Ok(())
    }

    async fn recv_response(&self, id: u64) -> Result<JsonRpcResponse, SessionError> {
        let mut events = self.events.lock().await;
        loop {
            let Some(event) = events.next_event().await? else {
                return Err(SessionError::Closed("event stream ended".to_string()));
            };
            if event.name != "message" {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unparseable message event");
                }
            }
        }
    }
}

/// Build the streaming GET. `Accept: text/event-stream` is the default
/// but a caller-configured Accept header replaces it, so exactly one
/// Accept value goes out.
fn stream_request(
    client: &reqwest::Client,
    url: &str,
    headers: &HashMap<String, String>,
) -> reqwest::RequestBuilder {
    let mut request = client.get(url);
    if !headers.keys().any(|name| name.eq_ignore_ascii_case("accept")) {
        request = request.header(ACCEPT, "text/event-stream");
    }
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request
}

struct SseEvent {
    name: String,
    data: String,
}

/// Incremental SSE parser over a byte stream.
struct EventStream {
    inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buffer: String,
}

impl EventStream {
    fn new(
        stream: impl futures_util::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: stream.boxed(),
            buffer: String::new(),
        }
    }

    /// Next complete event, or `None` when the stream ends cleanly.
    async fn next_event(&mut self) -> Result<Option<SseEvent>, SessionError> {
        loop {
            if let Some(event) = parse_event(&mut self.buffer) {
                return Ok(Some(event));
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk).replace("\r\n", "\n");
                    self.buffer.push_str(&text);
                }
                Some(Err(e)) => {
                    return Err(SessionError::Closed(format!("event stream failed: {e}")));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Pop one complete event off the front of the buffer, if present.
/// Events are blank-line delimited; the name defaults to "message" when
/// no `event:` field is given.
fn parse_event(buffer: &mut String) -> Option<SseEvent> {
    let end = buffer.find("\n\n")?;
    let block: String = buffer.drain(..end + 2).collect();

    let mut name = "message".to_string();
    let mut data = Vec::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.trim_start().to_string());
        }
    }
    Some(SseEvent {
        name,
        data: data.join("\n"),
    })
}
