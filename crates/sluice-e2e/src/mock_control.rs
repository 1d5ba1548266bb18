//! Scripted mock of the tunnel-provisioning control plane.
//!
//! The mock records every incoming request and replays a fixed script of
//! responses in order, repeating the last entry once the script runs out.
//! That repetition makes steady-state scenarios ("status stays running",
//! "every poll fails") trivial to express.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use tokio::net::TcpListener;

/// A recorded HTTP request for test assertions.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// HTTP method (GET, POST, DELETE, ...)
    pub method: String,
    /// Request path including any query string
    pub uri: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Parse the body as a JSON document.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body was not JSON")
    }

    /// Value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One entry of the response script.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub status: StatusCode,
    pub body: String,
}

/// A 200 response with the given body.
pub fn ok(body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status: StatusCode::OK,
        body: body.to_string(),
    }
}

/// A non-2xx response with the given status code and body.
pub fn error(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status: StatusCode::from_u16(status).expect("invalid status code"),
        body: body.to_string(),
    }
}

/// A mock control-plane server on an ephemeral local port.
pub struct MockControlPlane {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    script: Arc<Vec<ScriptedResponse>>,
    cursor: Arc<AtomicUsize>,
}

impl MockControlPlane {
    /// Start the mock with a response script. The script must not be empty.
    pub async fn start(script: Vec<ScriptedResponse>) -> Self {
        assert!(!script.is_empty(), "response script must not be empty");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock control plane");
        let addr = listener.local_addr().unwrap();

        let requests: Arc<RwLock<Vec<RecordedRequest>>> = Arc::new(RwLock::new(Vec::new()));
        let script = Arc::new(script);
        let cursor = Arc::new(AtomicUsize::new(0));

        let requests_clone = requests.clone();
        let script_clone = script.clone();
        let cursor_clone = cursor.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let requests = requests_clone.clone();
                let script = script_clone.clone();
                let cursor = cursor_clone.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        let script = script.clone();
                        let cursor = cursor.clone();
                        async move {
                            let method = req.method().to_string();
                            let uri = req
                                .uri()
                                .path_and_query()
                                .map(|pq| pq.to_string())
                                .unwrap_or_else(|| req.uri().path().to_string());

                            let headers: Vec<(String, String)> = req
                                .headers()
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                                .collect();

                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|b| b.to_bytes().to_vec())
                                .unwrap_or_default();

                            requests.write().push(RecordedRequest {
                                method,
                                uri,
                                headers,
                                body,
                            });

                            let index = cursor.fetch_add(1, Ordering::SeqCst);
                            let response = &script[index.min(script.len() - 1)];

                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(response.status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(response.body.clone())))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            script,
            cursor,
        }
    }

    /// Base URL for pointing a client at this mock.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// All recorded requests, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.read().len()
    }

    /// Whether the script has been consumed at least once through.
    pub fn script_exhausted(&self) -> bool {
        self.cursor.load(Ordering::SeqCst) >= self.script.len()
    }
}
