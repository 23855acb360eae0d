use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use stream_mapper_core::MappingConfig;
use tracing::{debug, warn};

use crate::errors::HarnessError;
use crate::one_shot::extract_field;
use crate::run::{RunOptions, StreamRun};
use crate::source::{ByteStream, EventStream, normalize_byte_stream};

const DEFAULT_METHOD: &str = "POST";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Request an operator configured for one upstream endpoint.
///
/// Loadable from JSON with camelCase keys:
/// `{"url": "...", "method": "POST", "headers": {...}, "body": {...}, "timeoutMs": 30000}`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON request body, sent as `application/json` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Connect and read-stall timeout. Long streams are fine as long as bytes
    /// keep arriving.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, HarnessError> {
        serde_json::from_str(raw)
            .map_err(|e| HarnessError::Config(format!("invalid endpoint config: {e}")))
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// HTTP client for one configured endpoint.
pub struct EndpointClient {
    client: reqwest::Client,
    config: EndpointConfig,
    method: reqwest::Method,
    headers: HeaderMap,
}

impl EndpointClient {
    /// Validates the config and builds the underlying client.
    pub fn new(config: EndpointConfig) -> Result<Self, HarnessError> {
        if config.url.trim().is_empty() {
            return Err(HarnessError::Validation(
                "endpoint url must not be empty".into(),
            ));
        }
        let method = reqwest::Method::from_bytes(config.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                HarnessError::Validation(format!("invalid HTTP method `{}`", config.method))
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HarnessError::Validation(format!("invalid header name `{name}`")))?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                HarnessError::Validation(format!("invalid value for header `{name}`"))
            })?;
            headers.insert(header_name, header_value);
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            method,
            headers,
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    async fn send(&self) -> Result<reqwest::Response, HarnessError> {
        debug!(
            event = "endpoint.request",
            domain = "endpoint",
            method = %self.method,
            url = %self.config.url
        );
        let mut request = self
            .client
            .request(self.method.clone(), self.config.url.as_str())
            .headers(self.headers.clone());
        if let Some(body) = &self.config.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HarnessError::transport_msg(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(
                event = "endpoint.upstream_error",
                domain = "endpoint",
                status = status.as_u16(),
                url = %self.config.url
            );
            return Err(HarnessError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Sends the configured request and returns the response body as chunks.
    pub async fn open(&self) -> Result<ByteStream, HarnessError> {
        let response = self.send().await?;
        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| HarnessError::transport_msg(format!("body read failed: {e}")))
        })))
    }

    /// Sends the request and normalizes the response with `mapping`.
    pub async fn stream_events(
        &self,
        mapping: Arc<MappingConfig>,
    ) -> Result<EventStream, HarnessError> {
        let bytes = self.open().await?;
        Ok(Box::pin(normalize_byte_stream(mapping, bytes)))
    }

    /// Sends the request and normalizes the response on a background task.
    pub async fn start_run(
        &self,
        mapping: Arc<MappingConfig>,
        options: RunOptions,
    ) -> Result<StreamRun, HarnessError> {
        let bytes = self.open().await?;
        StreamRun::start(mapping, bytes, options)
    }

    /// Sends the request, reads the whole body and extracts one field.
    pub async fn fetch_field(&self, path: &str) -> Result<Value, HarnessError> {
        let response = self.send().await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| HarnessError::transport_msg(format!("body read failed: {e}")))?;
        extract_field(&body, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt as _;
    use serde_json::json;
    use stream_mapper_core::UiEvent;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Serves one canned HTTP response and hands back the raw request text.
    async fn serve_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (request_tx, request_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            loop {
                let read = socket.read(&mut chunk).await.expect("read");
                if read == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..read]);
                if let Some(end) = header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    if buf.len() >= end + content_length(&head) {
                        break;
                    }
                }
            }
            let _ = request_tx.send(String::from_utf8_lossy(&buf).to_string());
            socket.write_all(response.as_bytes()).await.expect("write");
            let _ = socket.shutdown().await;
        });
        (format!("http://{addr}/v1/chat"), request_rx)
    }

    fn mapping() -> Arc<MappingConfig> {
        Arc::new(
            MappingConfig::from_value(json!({
                "doneSignal": "[DONE]",
                "eventMappings": [{
                    "sourceEventType": "data",
                    "targetUiEvent": "text-delta",
                    "fieldMappings": {"delta": "choices[0].delta.content"}
                }]
            }))
            .expect("mapping"),
        )
    }

    #[test]
    fn endpoint_config_loads_from_json_with_defaults() {
        let config = EndpointConfig::from_json_str(
            r#"{"url": "http://localhost:1/x", "headers": {"authorization": "Bearer k"}}"#,
        )
        .expect("config");
        assert_eq!(config.method, "POST");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.headers["authorization"], "Bearer k");
        assert!(config.body.is_none());
    }

    #[test]
    fn client_rejects_invalid_config() {
        assert!(matches!(
            EndpointClient::new(EndpointConfig::new("  ")),
            Err(HarnessError::Validation(_))
        ));
        assert!(matches!(
            EndpointClient::new(EndpointConfig::new("http://x").method("NOT A METHOD")),
            Err(HarnessError::Validation(_))
        ));
        assert!(matches!(
            EndpointClient::new(EndpointConfig::new("http://x").header("bad header", "v")),
            Err(HarnessError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn streams_sse_response_into_events() {
        let (url, request_rx) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n\
data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
data: [DONE]\n\n",
        )
        .await;
        let client = EndpointClient::new(
            EndpointConfig::new(url)
                .header("x-api-key", "secret")
                .body(json!({"stream": true})),
        )
        .expect("client");

        let events: Vec<UiEvent> = client
            .stream_events(mapping())
            .await
            .expect("open")
            .try_collect()
            .await
            .expect("events");
        assert_eq!(
            events,
            vec![
                UiEvent::TextDelta {
                    delta: "Hi".into(),
                    id: None
                },
                UiEvent::TextDelta {
                    delta: " there".into(),
                    id: None
                }
            ]
        );

        let request = request_rx.await.expect("request");
        assert!(request.starts_with("POST /v1/chat"));
        assert!(request.contains("x-api-key: secret"));
        assert!(request.contains("{\"stream\":true}"));
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let (url, _request) = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 10\r\nconnection: close\r\n\r\nslow down!",
        )
        .await;
        let client = EndpointClient::new(EndpointConfig::new(url)).expect("client");
        let err = match client.open().await {
            Ok(_) => panic!("429 must fail"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            HarnessError::Upstream {
                status: 429,
                body: "slow down!".into()
            }
        );
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn fetch_field_reads_one_shot_body() {
        let (url, _request) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 42\r\nconnection: close\r\n\r\n\
{\"choices\":[{\"message\":{\"content\":\"ok\"}}]}",
        )
        .await;
        let client = EndpointClient::new(EndpointConfig::new(url).method("get")).expect("client");
        let value = client
            .fetch_field("choices[0].message.content")
            .await
            .expect("field");
        assert_eq!(value, json!("ok"));
    }

    #[tokio::test]
    async fn start_run_reports_after_stream() {
        let (url, _request) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n\
event: ping\ndata: {}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
        )
        .await;
        let client = EndpointClient::new(EndpointConfig::new(url)).expect("client");
        let run = client
            .start_run(mapping(), RunOptions::default())
            .await
            .expect("run");
        let report = run.finish().await.expect("report");
        assert_eq!(report.stats.total_frames, 2);
        assert_eq!(report.stats.unmapped, 1);
        assert_eq!(report.events_emitted, 2);
        assert_eq!(report.unmapped_event_types().into_iter().collect::<Vec<_>>(), vec!["ping"]);
    }
}
