// SPDX-FileCopyrightText: 2026 Promptd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Ollama API.
//!
//! Provides [`OllamaClient`] which handles request construction, streaming
//! NDJSON responses, and transient error retry.

use std::time::Duration;

use futures::StreamExt;
use promptd_config::model::BackendConfig;
use promptd_core::{FragmentStream, PromptdError};
use tracing::{debug, warn};

use crate::ndjson;
use crate::types::{ApiErrorResponse, GenerateRequest, TagsResponse};

/// Delay between attempts after a transient error.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Timeout for the lightweight `/api/tags` probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for Ollama API communication.
///
/// Retries transient errors (429, 500, 502, 503) before the stream starts.
/// Once fragments are flowing, failures are reported through the stream.
///
/// There is no overall deadline on a generation: `request_timeout_secs` bounds
/// how long the backend may stay silent between reads, so a stream that keeps
/// producing fragments runs to completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    idle_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &BackendConfig) -> Result<Self, PromptdError> {
        let idle_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(idle_timeout)
            .build()
            .map_err(|e| PromptdError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            idle_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a streaming generation.
    ///
    /// Dropping the returned stream closes the connection, which stops
    /// generation on the server.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<FragmentStream, PromptdError> {
        let url = format!("{}/api/generate", self.base_url);
        let mut req = request.clone();
        req.stream = true;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying generate request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            debug!(status = %status, attempt, model = %req.model, "generate response received");

            if status.is_success() {
                let idle_timeout = self.idle_timeout;
                let body = response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| body_error(e, idle_timeout)));
                return Ok(ndjson::decode_fragments(Box::pin(body)));
            }

            let body = response.text().await.unwrap_or_default();

            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(PromptdError::backend(format!(
                    "API returned {status}: {body}"
                )));
                continue;
            }

            return Err(PromptdError::backend(error_message(status, &body)));
        }

        Err(last_error.unwrap_or_else(|| {
            PromptdError::backend("generate request failed after retries")
        }))
    }

    /// Names of the models available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, PromptdError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PromptdError::backend(error_message(status, &body)));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| PromptdError::Backend {
            message: format!("failed to parse model list: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

fn request_error(e: reqwest::Error) -> PromptdError {
    let message = if is_timeout(&e) {
        format!("HTTP request timed out: {e}")
    } else {
        format!("HTTP request failed: {e}")
    };
    PromptdError::Backend {
        message,
        source: Some(Box::new(e)),
    }
}

/// `true` when `e`, or anything in its source chain, is a timeout.
fn is_timeout(e: &reqwest::Error) -> bool {
    if e.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return true;
        }
        source = err.source();
    }
    false
}

/// Describe a failure while reading the response body.
fn body_error(e: reqwest::Error, idle_timeout: Duration) -> std::io::Error {
    if is_timeout(&e) {
        std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "backend timed out: no data for {}s (read timeout)",
                idle_timeout.as_secs()
            ),
        )
    } else {
        std::io::Error::other(e)
    }
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!("Ollama API error ({status}): {}", api_err.error),
        Err(_) => format!("API returned {status}: {body}"),
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(base_url: &str, max_retries: u32) -> OllamaClient {
        let config = BackendConfig {
            base_url: base_url.to_string(),
            max_retries,
            ..BackendConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    fn test_request(context: Option<Vec<i64>>) -> GenerateRequest {
        GenerateRequest {
            model: "llama3".into(),
            prompt: "Why is the sky blue?".into(),
            stream: false,
            context,
        }
    }

    fn ndjson_body() -> String {
        [
            r#"{"model":"llama3","response":"The","done":false}"#,
            r#"{"model":"llama3","response":" sky","done":false}"#,
            r#"{"model":"llama3","response":"","done":true,"context":[10,11]}"#,
        ]
        .join("\n")
            + "\n"
    }

    #[tokio::test]
    async fn generate_streams_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": true,
                "context": [1, 2]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson_body(), "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let stream = client.generate(&test_request(Some(vec![1, 2]))).await.unwrap();
        let fragments: Vec<_> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].text, "The");
        assert_eq!(fragments[1].text, " sky");
        assert!(fragments[2].done);
        assert_eq!(fragments[2].context.as_ref().unwrap().tokens(), &[10, 11]);
    }

    #[tokio::test]
    async fn generate_retries_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson_body(), "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 1);
        let stream = client.generate(&test_request(None)).await.unwrap();
        let fragments: Vec<_> = stream.collect().await;
        assert_eq!(fragments.len(), 3);
    }

    #[tokio::test]
    async fn generate_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let err = client.generate(&test_request(None)).await.err().unwrap();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn generate_non_transient_error_uses_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'nope' not found"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 3);
        let err = client.generate(&test_request(None)).await.err().unwrap();
        assert!(err.to_string().contains("model 'nope' not found"));
    }

    #[tokio::test]
    async fn list_models_reads_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3:latest"}, {"name": "mistral:7b"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 0);
        let models = client.list_models().await.unwrap();
        assert_eq!(models, vec!["llama3:latest", "mistral:7b"]);
    }

    /// A bare HTTP/1.1 server that answers one request with a chunked NDJSON
    /// body, writing `lines` with `gap` between them and then holding the
    /// connection open for `tail` before closing the body.
    async fn spawn_trickle_server(lines: Vec<String>, gap: Duration, tail: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read headers, then the declared body.
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for line in lines {
                let payload = format!("{line}\n");
                let chunk = format!("{:x}\r\n{payload}\r\n", payload.len());
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
                socket.flush().await.ok();
                tokio::time::sleep(gap).await;
            }
            tokio::time::sleep(tail).await;
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        format!("http://{addr}")
    }

    fn timeout_client(base_url: &str, request_timeout_secs: u64) -> OllamaClient {
        let config = BackendConfig {
            base_url: base_url.to_string(),
            request_timeout_secs,
            max_retries: 0,
            ..BackendConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn slow_stream_outlives_request_timeout() {
        let lines = vec![
            r#"{"response":"t0","done":false}"#.to_string(),
            r#"{"response":"t1","done":false}"#.to_string(),
            r#"{"response":"t2","done":false}"#.to_string(),
            r#"{"response":"t3","done":false}"#.to_string(),
            r#"{"response":"","done":true,"context":[9]}"#.to_string(),
        ];
        // Five lines 400ms apart: about 2s in total, each gap under the 1s limit.
        let url = spawn_trickle_server(lines, Duration::from_millis(400), Duration::ZERO).await;

        let client = timeout_client(&url, 1);
        let stream = client.generate(&test_request(None)).await.unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 5, "stream was cut short: {items:?}");
        let texts: Vec<_> = items
            .iter()
            .map(|i| i.as_ref().unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["t0", "t1", "t2", "t3", ""]);
        let last = items[4].as_ref().unwrap();
        assert!(last.done);
        assert_eq!(last.context.as_ref().unwrap().tokens(), &[9]);
    }

    #[tokio::test]
    async fn silent_backend_hits_read_timeout() {
        let lines = vec![r#"{"response":"t0","done":false}"#.to_string()];
        let url = spawn_trickle_server(lines, Duration::ZERO, Duration::from_secs(5)).await;

        let client = timeout_client(&url, 1);
        let stream = client.generate(&test_request(None)).await.unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "t0");
        let err = items[1].as_ref().unwrap_err().to_string();
        assert!(err.contains("timed out"), "unexpected error: {err}");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = test_client("http://localhost:11434/", 0);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn transient_statuses() {
        for code in [429, 500, 502, 503] {
            assert!(is_transient_error(reqwest::StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_transient_error(reqwest::StatusCode::NOT_FOUND));
    }
}
