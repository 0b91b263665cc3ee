//! request/response contract with the assistant backend.
//!
//! - one POST per message, body `{user_id, role, team_id: null, message}`.
//! - any non-2xx status is a transport failure; a 2xx body is returned as
//!   untyped json even when it carries an application-level refusal.
//! - native: ureq (blocking) on tokio's blocking pool, bounded by a timeout.
//! - wasm: gloo-net fetch, raced against a gloo-timers deadline.

use bevy::prelude::*;
use bevy::tasks::futures_lite::future;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;

/// wire body for the chat endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatPayload {
    pub user_id: String,
    pub role: String,
    /// always sent, always null for this widget.
    pub team_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("server error: {0}")]
    Status(u16),
    #[error("{0}")]
    Network(String),
    #[error("invalid reply: {0}")]
    Decode(String),
    #[error("no reply within {}s", .0.as_secs_f32())]
    Timeout(Duration),
}

/// the assistant backend as seen by the widget.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait AssistantTransport: Send + Sync + 'static {
    async fn send(&self, payload: ChatPayload) -> Result<Value, TransportError>;

    /// liveness probe; transports without one report healthy.
    async fn health(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// the transport used by the plugin.
#[derive(Resource, Clone)]
pub struct Transport(pub Arc<dyn AssistantTransport>);

impl Transport {
    pub fn new(transport: impl AssistantTransport) -> Self {
        Self(Arc::new(transport))
    }
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self { endpoint: endpoint.into(), timeout }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `<base>/health`, where base is the endpoint minus a trailing `/chat`.
    pub fn health_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let base = base.strip_suffix("/chat").unwrap_or(base);
        format!("{base}/health")
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;

    impl HttpTransport {
        fn agent(&self) -> ureq::Agent {
            ureq::Agent::config_builder()
                .timeout_global(Some(self.timeout))
                .build()
                .into()
        }
    }

    fn map_ureq(err: ureq::Error, timeout: Duration) -> TransportError {
        match err {
            ureq::Error::StatusCode(code) => TransportError::Status(code),
            ureq::Error::Timeout(_) => TransportError::Timeout(timeout),
            ureq::Error::Json(e) => TransportError::Decode(e.to_string()),
            other => TransportError::Network(other.to_string()),
        }
    }

    fn post_json(
        agent: &ureq::Agent,
        url: &str,
        payload: &ChatPayload,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut res = agent
            .post(url)
            .header("accept", "application/json")
            .send_json(payload)
            .map_err(|e| map_ureq(e, timeout))?;
        res.body_mut()
            .read_json::<Value>()
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    fn get_ok(agent: &ureq::Agent, url: &str, timeout: Duration) -> Result<(), TransportError> {
        agent.get(url).call().map_err(|e| map_ureq(e, timeout))?;
        Ok(())
    }

    #[async_trait]
    impl AssistantTransport for HttpTransport {
        async fn send(&self, payload: ChatPayload) -> Result<Value, TransportError> {
            let agent = self.agent();
            let url = self.endpoint.clone();
            let timeout = self.timeout;
            // ureq is blocking; keep it off the async workers
            tokio::task::spawn_blocking(move || post_json(&agent, &url, &payload, timeout))
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?
        }

        async fn health(&self) -> Result<(), TransportError> {
            let agent = self.agent();
            let url = self.health_url();
            let timeout = self.timeout;
            tokio::task::spawn_blocking(move || get_ok(&agent, &url, timeout))
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use super::*;
    use gloo_net::http::Request;

    #[async_trait(?Send)]
    impl AssistantTransport for HttpTransport {
        async fn send(&self, payload: ChatPayload) -> Result<Value, TransportError> {
            let resp = Request::post(&self.endpoint)
                .header("accept", "application/json")
                .json(&payload)
                .map_err(|e| TransportError::Network(e.to_string()))?
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            if !resp.ok() {
                return Err(TransportError::Status(resp.status()));
            }
            resp.json::<Value>()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))
        }

        async fn health(&self) -> Result<(), TransportError> {
            let resp = Request::get(&self.health_url())
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            if !resp.ok() {
                return Err(TransportError::Status(resp.status()));
            }
            Ok(())
        }
    }
}

/// one exchange, bounded by `timeout`. expiry reads as a transport failure
/// so the busy flag is always released.
pub async fn run_exchange(
    transport: Arc<dyn AssistantTransport>,
    payload: ChatPayload,
    timeout: Duration,
) -> Result<Value, TransportError> {
    let expiry = async move {
        sleep(timeout).await;
        Err(TransportError::Timeout(timeout))
    };
    future::or(transport.send(payload), expiry).await
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep(duration: Duration) {
    let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
    gloo_timers::future::TimeoutFuture::new(millis).await;
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn payload(message: &str) -> ChatPayload {
        ChatPayload {
            user_id: "guest".into(),
            role: "executive".into(),
            team_id: None,
            message: message.into(),
        }
    }

    /// serves one canned response and hands back the request body it saw.
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    } else if name.eq_ignore_ascii_case("transfer-encoding") {
                        chunked = value.trim().eq_ignore_ascii_case("chunked");
                    }
                }
            }
            let mut request_body = Vec::new();
            if chunked {
                loop {
                    let mut size = String::new();
                    reader.read_line(&mut size).unwrap();
                    let size = usize::from_str_radix(size.trim(), 16).unwrap();
                    let mut chunk = vec![0u8; size + 2];
                    reader.read_exact(&mut chunk).unwrap();
                    if size == 0 {
                        break;
                    }
                    request_body.extend_from_slice(&chunk[..size]);
                }
            } else {
                request_body.resize(content_length, 0);
                reader.read_exact(&mut request_body).unwrap();
            }

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (format!("http://{addr}/chat"), handle)
    }

    struct Hung;

    #[async_trait]
    impl AssistantTransport for Hung {
        async fn send(&self, _payload: ChatPayload) -> Result<Value, TransportError> {
            std::future::pending().await
        }
    }

    #[test]
    fn payload_serializes_null_team() {
        let raw = serde_json::to_value(payload("hi")).unwrap();
        assert_eq!(
            raw,
            json!({ "user_id": "guest", "role": "executive", "team_id": null, "message": "hi" })
        );
    }

    #[test]
    fn health_url_is_derived_from_endpoint() {
        let t = HttpTransport::new("http://localhost:8000/chat", Duration::from_secs(1));
        assert_eq!(t.health_url(), "http://localhost:8000/health");
        let t = HttpTransport::new("https://a.example/api/", Duration::from_secs(1));
        assert_eq!(t.health_url(), "https://a.example/api/health");
    }

    #[tokio::test]
    async fn success_returns_json_body() {
        let (url, server) = serve_once("200 OK", r#"{"reply":"forbidden","reason":"nope"}"#);
        let transport = HttpTransport::new(url, Duration::from_secs(5));

        let reply = transport.send(payload("approve all leaves")).await.unwrap();
        assert_eq!(reply, json!({ "reply": "forbidden", "reason": "nope" }));

        let seen: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(seen["message"], "approve all leaves");
        assert_eq!(seen["team_id"], Value::Null);
    }

    #[tokio::test]
    async fn non_success_status_is_transport_failure() {
        let (url, server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#);
        let transport = HttpTransport::new(url, Duration::from_secs(5));

        let err = transport.send(payload("hi")).await.unwrap_err();
        assert_eq!(err, TransportError::Status(503));
        assert_eq!(err.to_string(), "server error: 503");
        server.join().unwrap();
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_failure() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let transport = HttpTransport::new(format!("http://127.0.0.1:{port}/chat"), Duration::from_secs(2));

        let err = transport.send(payload("hi")).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)), "{err:?}");
    }

    struct Instant;

    #[async_trait]
    impl AssistantTransport for Instant {
        async fn send(&self, payload: ChatPayload) -> Result<Value, TransportError> {
            Ok(json!({ "message": payload.message }))
        }
    }

    #[tokio::test]
    async fn hung_exchange_times_out() {
        let timeout = Duration::from_millis(50);
        let err = run_exchange(Arc::new(Hung), payload("hi"), timeout).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(timeout));
        assert_eq!(err.to_string(), "no reply within 0.05s");
    }

    #[tokio::test]
    async fn reply_before_deadline_wins() {
        let reply = run_exchange(Arc::new(Instant), payload("hi"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply, json!({ "message": "hi" }));
    }
}
