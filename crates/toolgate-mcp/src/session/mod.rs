//! Protocol sessions over stdio and SSE transports.
//!
//! A session is short-lived: the factory opens a transport, performs
//! the `initialize` handshake, and hands back a [`Session`] that one
//! facade operation uses and drops. Transport failures are collected
//! as [`SessionError`] internally and classified exactly once, at this
//! boundary, into the caller-facing `ProviderError` taxonomy.

mod sse;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use toolgate_core::{ProviderConfig, ProviderError, TransportKind};

use crate::protocol::{
    InitializeResult, JsonRpcNotification, JsonRpcRequest, METHOD_NOT_FOUND, PROTOCOL_VERSION,
};
use crate::registry::ProcessRegistry;
use self::sse::SseTransport;
use self::stdio::StdioTransport;

/// Internal transport and protocol failures, prior to classification.
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The provider answered with a JSON-RPC error object.
    #[error("Provider error {code}: {message}")]
    Server { code: i64, message: String },

    /// Non-success HTTP status from the streaming endpoint.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The HTTP request itself failed (DNS, refused, reset, ...).
    #[error("Request to {url} failed: {detail}")]
    Request { url: String, detail: String },

    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Concurrent transport sub-tasks failed together.
    #[error("Multiple transport failures ({} causes)", .0.len())]
    Aggregate(Vec<SessionError>),
}

impl SessionError {
    /// Unwrap aggregates down to the first underlying cause, so the
    /// message callers see names a concrete failure.
    pub(crate) fn first_cause(self) -> Self {
        match self {
            Self::Aggregate(mut causes) => {
                if causes.is_empty() {
                    Self::Protocol("empty failure aggregate".to_string())
                } else {
                    causes.swap_remove(0).first_cause()
                }
            }
            other => other,
        }
    }

    /// Whether a failed resource operation should be read as "this
    /// provider does not implement resources" rather than a hard error.
    pub(crate) fn is_resource_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Aggregate(_)
                | Self::Server {
                    code: METHOD_NOT_FOUND,
                    ..
                }
        )
    }

    /// Classify a failure from an already-open session.
    pub(crate) fn into_op_error(self) -> ProviderError {
        match self.first_cause() {
            Self::Timeout(timeout) => ProviderError::Timeout(format!(
                "Provider did not answer within {}s",
                timeout.as_secs()
            )),
            other => ProviderError::Client(other.to_string()),
        }
    }
}

/// Classify a failure that occurred while opening a session, with
/// actionable hints for the common misconfigurations.
fn classify_connect(err: SessionError, endpoint: &str, timeout: Duration) -> ProviderError {
    match err.first_cause() {
        SessionError::Timeout(_) => ProviderError::Timeout(format!(
            "Connection to {endpoint} timed out after {}s. Check that the provider is running and responsive.",
            timeout.as_secs()
        )),
        SessionError::Http { status: 400, url } => ProviderError::Connection(format!(
            "Provider returned 400 Bad Request for {url}. The URL may not be a streaming protocol endpoint."
        )),
        SessionError::Http { status: 404, url } => ProviderError::Connection(format!(
            "Endpoint not found (404). Check that the URL is correct: {url}"
        )),
        SessionError::Http { status, url } => {
            ProviderError::Connection(format!("Provider returned HTTP {status} for {url}"))
        }
        SessionError::Request { url, detail } => {
            if detail.contains("refused") {
                ProviderError::Connection(format!(
                    "Connection refused for {url}. Check that the provider is running."
                ))
            } else {
                ProviderError::Connection(format!("Could not reach {url}: {detail}"))
            }
        }
        cause @ (SessionError::Io(_) | SessionError::Closed(_)) => {
            ProviderError::Connection(format!("Could not connect to {endpoint}: {cause}"))
        }
        other => ProviderError::Client(other.to_string()),
    }
}

enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

/// One live protocol session. Dropped after a single facade operation;
/// dropping releases the transport (for SSE the stream connection, for
/// stdio only the borrow of the registry-owned pipes).
pub struct Session {
    transport: Transport,
    request_id: AtomicU64,
    timeout: Duration,
}

impl Session {
    fn new(transport: Transport, timeout: Duration) -> Self {
        Self {
            transport,
            request_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Send one request and wait for the matching response, bounded by
    /// the provider's configured timeout.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_string(&request)?;

        let round_trip = async {
            match &self.transport {
                Transport::Stdio(transport) => transport.round_trip(id, payload).await,
                Transport::Sse(transport) => transport.round_trip(id, payload).await,
            }
        };
        let response = tokio::time::timeout(self.timeout, round_trip)
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))??;

        if let Some(error) = response.error {
            return Err(SessionError::Server {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| SessionError::Protocol(format!("{method} response carried no result")))
    }

    async fn notify(&self, method: &str) -> Result<(), SessionError> {
        let note = JsonRpcNotification::new(method);
        let payload = serde_json::to_string(&note)?;
        match &self.transport {
            Transport::Stdio(transport) => transport.send_notification(payload).await,
            Transport::Sse(transport) => transport.send_notification(payload).await,
        }
    }

    /// Protocol handshake: `initialize` followed by the
    /// `notifications/initialized` acknowledgement.
    async fn initialize(&self) -> Result<InitializeResult, SessionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "toolgate",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });
        let result = self.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        self.notify("notifications/initialized").await?;
        Ok(init)
    }

    pub(crate) async fn list_tools(&self) -> Result<Value, SessionError> {
        self.request("tools/list", None).await
    }

    pub(crate) async fn call_tool(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
    ) -> Result<Value, SessionError> {
        self.request("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await
    }

    pub(crate) async fn list_resources(&self) -> Result<Value, SessionError> {
        self.request("resources/list", None).await
    }

    pub(crate) async fn read_resource(&self, uri: &str) -> Result<Value, SessionError> {
        self.request("resources/read", Some(json!({"uri": uri})))
            .await
    }
}

/// Opens fully-initialized sessions against configured providers.
///
/// Stdio sessions attach to a process already tracked by the registry;
/// the factory never starts processes itself. SSE sessions share one
/// HTTP client across opens for connection pooling.
#[derive(Clone)]
pub struct SessionFactory {
    registry: Arc<ProcessRegistry>,
    http: reqwest::Client,
}

impl SessionFactory {
    #[must_use]
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self {
            registry,
            http: reqwest::Client::new(),
        }
    }

    /// Open a session and complete the protocol handshake. Everything
    /// up to and including the handshake is bounded by the provider's
    /// configured timeout.
    pub async fn open(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
    ) -> Result<Session, ProviderError> {
        if let Err(message) = config.validate() {
            return Err(ProviderError::Connection(message));
        }
        let timeout = config.timeout();

        match config.transport {
            TransportKind::Stdio => {
                let command = config.command.as_deref().unwrap_or_default();
                tracing::debug!(
                    provider_id = %provider_id,
                    command = %command,
                    "Opening stdio session"
                );

                let pipes = self.registry.stdio_pipes(provider_id).ok_or_else(|| {
                    ProviderError::Connection(format!(
                        "No running process for provider '{provider_id}'. \
                         Start the process before using its tools."
                    ))
                })?;
                let session = Session::new(Transport::Stdio(StdioTransport::new(pipes)), timeout);
                let endpoint = format!("stdio process '{command}'");
                self.handshake(session, provider_id, &endpoint, timeout)
                    .await
            }
            TransportKind::Sse => {
                let url = config.url.as_deref().unwrap_or_default();
                let headers = config.headers.clone().unwrap_or_default();
                tracing::debug!(provider_id = %provider_id, url = %url, "Opening SSE session");

                let connect = SseTransport::connect(self.http.clone(), url, &headers);
                let transport = match tokio::time::timeout(timeout, connect).await {
                    Ok(Ok(transport)) => transport,
                    Ok(Err(e)) => return Err(classify_connect(e, url, timeout)),
                    Err(_) => {
                        return Err(classify_connect(SessionError::Timeout(timeout), url, timeout));
                    }
                };
                let session = Session::new(Transport::Sse(transport), timeout);
                self.handshake(session, provider_id, url, timeout).await
            }
        }
    }

    async fn handshake(
        &self,
        session: Session,
        provider_id: &str,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Session, ProviderError> {
        // The per-request timeout inside `request` does not cover the
        // initialized notification; bound the whole handshake here so a
        // provider that stalls the notification cannot hang the caller.
        let outcome = tokio::time::timeout(timeout, session.initialize())
            .await
            .unwrap_or(Err(SessionError::Timeout(timeout)));
        match outcome {
            Ok(init) => {
                let (server, version) = init.server_info.map_or_else(
                    || ("unknown".to_string(), String::new()),
                    |info| (info.name, info.version),
                );
                tracing::info!(
                    provider_id = %provider_id,
                    server = %server,
                    server_version = %version,
                    protocol = %init.protocol_version,
                    "Session initialized"
                );
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(provider_id = %provider_id, error = %e, "Session handshake failed");
                Err(classify_connect(e, endpoint, timeout))
            }
        }
    }
}
