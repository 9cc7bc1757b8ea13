//! HTTP implementation of the chat transport

use super::{
    sanitize_context, stream_channel, validate_message, ChatError, ChatRequest, ChatTransport,
    EventSink, StreamHandle,
};
use crate::config::ChatConfig;
use crate::sse::{SseDecoder, StreamEvent};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Health of the chat service as reported by `GET /api/health`.
///
/// The service answers 200 when every dependency is up and 503 with the same
/// body, marked `degraded`, when any is down.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceHealth>,
    /// Seconds since the Unix epoch
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// One dependency's entry in a [`HealthReport`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    pub fn service_status(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(|service| service.status.as_str())
    }

    /// When the report was produced
    #[allow(clippy::cast_possible_truncation)]
    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        let millis = (self.timestamp? * 1000.0).round();
        millis.is_finite().then(|| DateTime::from_timestamp_millis(millis as i64))?
    }
}

/// Chat transport over `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    chat_url: String,
    health_url: String,
    max_message_length: usize,
}

impl HttpTransport {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::connection(None, format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            chat_url: config.chat_endpoint(),
            health_url: config.health_endpoint(),
            max_message_length: config.max_message_length,
        })
    }

    /// Query the service's health endpoint
    pub async fn health(&self) -> Result<HealthReport, ChatError> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            // A degraded service still reports which dependency is down
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<HealthReport>(&body) {
                Ok(report) => {
                    tracing::warn!(status = %report.status, "Chat service degraded");
                    Ok(report)
                }
                Err(_) => Err(status_error(status, &body)),
            };
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response.json::<HealthReport>().await.map_err(|e| {
            ChatError::connection(Some(status.as_u16()), format!("Invalid health response: {e}"))
        })
    }
}

impl ChatTransport for HttpTransport {
    fn open(&self, request: ChatRequest) -> Result<StreamHandle, ChatError> {
        let message = validate_message(&request.message, self.max_message_length)?;
        let request = ChatRequest {
            message,
            context: sanitize_context(request.context.as_deref()),
            ..request
        };

        let (sink, handle) = stream_channel();
        tokio::spawn(stream_response(
            self.client.clone(),
            self.chat_url.clone(),
            request,
            sink,
        ));
        Ok(handle)
    }
}

/// Issue the request and pump the body through the decoder into `sink`
async fn stream_response(client: Client, url: String, request: ChatRequest, sink: EventSink) {
    tracing::debug!(
        url = %url,
        session_id = %request.session_id,
        message_length = request.message.chars().count(),
        has_context = request.context.is_some(),
        "Opening chat stream"
    );

    let send = client
        .post(&url)
        .header(header::ACCEPT, "text/event-stream")
        .json(&request)
        .send();

    let response = tokio::select! {
        () = sink.cancelled() => return,
        result = send => result,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Chat request failed");
            sink.deliver(Err(request_error(e)));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            () = sink.cancelled() => return,
            body = response.text() => body.unwrap_or_default(),
        };
        tracing::warn!(status = status.as_u16(), "Chat request rejected");
        sink.deliver(Err(status_error(status, &body)));
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut delivered = 0usize;

    loop {
        let chunk = tokio::select! {
            () = sink.cancelled() => {
                tracing::debug!(delivered, "Chat stream cancelled");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for event in decoder
                    .feed(&bytes)
                    .into_iter()
                    .filter_map(StreamEvent::from_frame)
                {
                    let terminal = event.is_terminal();
                    if !sink.deliver(Ok(event)) {
                        return;
                    }
                    delivered += 1;
                    if terminal {
                        tracing::debug!(delivered, "Chat stream completed");
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, delivered, "Chat stream read failed");
                sink.deliver(Err(ChatError::stream(format!(
                    "Failed to read the answer stream: {e}"
                ))));
                return;
            }
            None => {
                if decoder.has_pending() {
                    tracing::warn!(
                        buffered = decoder.buffered_len(),
                        "Chat stream ended inside an unterminated event"
                    );
                }
                // Dropping the sink makes the handle report the premature end
                return;
            }
        }
    }
}

fn request_error(e: reqwest::Error) -> ChatError {
    let status = e.status().map(|s| s.as_u16());
    if e.is_timeout() {
        ChatError::connection(status, format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ChatError::connection(status, format!("Could not connect to the chat service: {e}"))
    } else {
        ChatError::connection(status, format!("Request failed: {e}"))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

fn status_error(status: StatusCode, body: &str) -> ChatError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| match parsed.detail {
            Some(serde_json::Value::String(detail)) => Some(detail),
            _ => parsed.message,
        });

    let message = match detail {
        Some(detail) => detail,
        None if status == StatusCode::TOO_MANY_REQUESTS => {
            "Rate limit exceeded. Please wait before sending more requests.".to_string()
        }
        None => format!("Chat service returned HTTP {status}"),
    };
    ChatError::connection(Some(status.as_u16()), message)
}
