//! End-to-end tests against a fake SSE provider.
//!
//! The server is a raw TCP listener speaking just enough HTTP: a
//! streaming GET that announces the message endpoint, and POSTs whose
//! responses come back as events on the stream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use toolgate_mcp::{
    ProcessRegistry, ProviderConfig, ProviderError, ProviderOperations, SessionFactory,
};

fn ops_for(addr: SocketAddr, provider_id: &str) -> ProviderOperations {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let config = ProviderConfig::sse(format!("http://{addr}/sse")).with_timeout_secs(10);
    let factory = SessionFactory::new(Arc::new(ProcessRegistry::new()));
    ProviderOperations::new(provider_id, config, factory)
}

#[derive(Clone, Copy)]
struct ServerBehavior {
    resources_supported: bool,
    /// Accept the initialized notification POST but never answer it.
    stall_initialized: bool,
}

/// Run a provider server on its own runtime thread and return its
/// address. The thread lives for the rest of the test process.
fn start_server(resources_supported: bool) -> SocketAddr {
    start_server_with(ServerBehavior {
        resources_supported,
        stall_initialized: false,
    })
}

fn start_server_with(behavior: ServerBehavior) -> SocketAddr {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            serve(listener, behavior).await;
        });
    });
    rx.recv().unwrap()
}

/// Server that rejects every request with 404.
fn start_not_found_server() -> SocketAddr {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let _ = read_head(&mut stream).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });
    });
    rx.recv().unwrap()
}

async fn read_head(stream: &mut TcpStream) -> (String, usize) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.unwrap();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap();
        }
    }
    (request_line, content_length)
}

async fn serve(listener: TcpListener, behavior: ServerBehavior) {
    let sse_writer: Arc<Mutex<Option<OwnedWriteHalf>>> = Arc::new(Mutex::new(None));
    loop {
        let (stream, _) = listener.accept().await.unwrap();
        let writer = Arc::clone(&sse_writer);
        tokio::spawn(handle_connection(stream, writer, behavior));
    }
}

async fn handle_connection(
    stream: TcpStream,
    sse_writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    behavior: ServerBehavior,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.unwrap();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap();
        }
    }

    if request_line.starts_with("GET") {
        // Install the stream writer before the endpoint event goes out,
        // so a fast POST cannot observe an empty slot.
        let mut slot = sse_writer.lock().await;
        write_half
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\r\n",
            )
            .await
            .unwrap();
        *slot = Some(write_half);
        slot.as_mut()
            .unwrap()
            .write_all(b"event: endpoint\ndata: /message\n\n")
            .await
            .unwrap();
        drop(slot);

        // Hold the read side open until the client drops the session.
        let mut sink = [0u8; 256];
        loop {
            match reader.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await.unwrap();
        let message: Value = serde_json::from_slice(&body).unwrap();

        if behavior.stall_initialized
            && message["method"].as_str() == Some("notifications/initialized")
        {
            // Hold the POST open without ever answering it.
            tokio::time::sleep(std::time::Duration::from_secs(600)).await;
            return;
        }

        write_half
            .write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        if let Some(response) = respond_to(&message, behavior.resources_supported) {
            if let Some(writer) = sse_writer.lock().await.as_mut() {
                let frame = format!("event: message\ndata: {response}\n\n");
                let _ = writer.write_all(frame.as_bytes()).await;
            }
        }
    }
}

fn respond_to(message: &Value, resources_supported: bool) -> Option<Value> {
    let method = message["method"].as_str().unwrap_or_default();
    let id = message.get("id")?.clone();
    let response = match method {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "fake-sse-provider", "version": "0.1.0"},
                "capabilities": {"tools": {}},
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [
                {"name": "lookup", "description": "Look things up", "inputSchema": {"type": "object"}}
            ]}
        }),
        "tools/call" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"content": [{"type": "text", "text": "found it"}]}
        }),
        "resources/list" if resources_supported => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"resources": [
                {"uri": "file:///data.txt", "name": "data", "mimeType": "text/plain"}
            ]}
        }),
        "resources/read" if resources_supported => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"contents": [{"uri": "file:///data.txt", "text": "contents here"}]}
        }),
        "resources/list" | "resources/read" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }),
        _ => return None,
    };
    Some(response)
}

#[test]
fn test_list_and_call_over_sse() {
    let addr = start_server(true);
    let ops = ops_for(addr, "sse-provider");

    let tools = ops.list_tools().expect("list_tools should succeed");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "lookup");

    let result = ops
        .call_tool("lookup", HashMap::new())
        .expect("call_tool should succeed");
    assert!(result.success);
    assert_eq!(result.content.len(), 1);
}

#[test]
fn test_resources_over_sse() {
    let addr = start_server(true);
    let ops = ops_for(addr, "sse-provider");

    let resources = ops.list_resources().expect("list_resources should succeed");
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, "file:///data.txt");
    assert_eq!(resources[0].mime_type.as_deref(), Some("text/plain"));

    let read = ops
        .read_resource("file:///data.txt")
        .expect("read_resource should succeed");
    assert!(read.success);
    assert_eq!(read.content.len(), 1);
}

#[test]
fn test_resources_tolerated_when_unsupported() {
    let addr = start_server(false);
    let ops = ops_for(addr, "tools-only-sse");

    let resources = ops.list_resources().expect("unsupported should not error");
    assert!(resources.is_empty());

    let read = ops
        .read_resource("file:///x")
        .expect("unsupported should not error");
    assert!(!read.success);
    assert_eq!(read.error.as_deref(), Some("Provider does not support resources"));
}

#[test]
fn test_not_found_endpoint_hint() {
    let addr = start_not_found_server();
    let ops = ops_for(addr, "bad-url");

    let err = ops.list_tools().unwrap_err();
    assert!(matches!(err, ProviderError::Connection(_)), "got: {err}");
    assert!(err.to_string().contains("404"));
    assert!(err.to_string().contains(&addr.to_string()));
}

#[test]
fn test_stalled_handshake_times_out() {
    let addr = start_server_with(ServerBehavior {
        resources_supported: true,
        stall_initialized: true,
    });
    let config = ProviderConfig::sse(format!("http://{addr}/sse")).with_timeout_secs(1);
    let factory = SessionFactory::new(Arc::new(ProcessRegistry::new()));
    let ops = ProviderOperations::new("stalling", config, factory);

    let begin = std::time::Instant::now();
    let err = ops.list_tools().unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(_)), "got: {err}");
    assert!(begin.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn test_connection_refused_hint() {
    // Bind to grab a free port, then drop the listener so nothing is
    // listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ops = ops_for(addr, "unreachable");
    let err = ops.list_tools().unwrap_err();
    assert!(matches!(err, ProviderError::Connection(_)), "got: {err}");
}
