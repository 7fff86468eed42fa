use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::beam::ray::RayId;
use crate::core::builtin_providers::find_builtin_provider;
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// One progress report from a ray's streaming task. `generation` is minted by
/// the beam store when the stream is dispatched; events whose generation no
/// longer matches the ray are dropped as stale.
#[derive(Clone, Debug)]
pub struct RayStreamEvent {
    pub ray_id: RayId,
    pub generation: u64,
    pub message: StreamMessage,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub provider_name: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub ray_id: RayId,
    pub generation: u64,
}

/// The streaming generation collaborator consumed by the beam store.
/// Implementations must honor cooperative cancellation via the token in the
/// params and must emit nothing after cancellation fires.
pub trait StreamDispatcher: Send + Sync {
    fn spawn_stream(&self, params: StreamParams);
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<RayStreamEvent>,
    ray_id: RayId,
    generation: u64,
) -> bool {
    let send = |message: StreamMessage| {
        let _ = tx.send(RayStreamEvent {
            ray_id,
            generation,
            message,
        });
    };

    if payload == "[DONE]" {
        send(StreamMessage::End);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    send(StreamMessage::Chunk(content.clone()));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            send(StreamMessage::Error(format_api_error(payload)));
            send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<RayStreamEvent>,
    ray_id: RayId,
    generation: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, ray_id, generation))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

const MAX_ERROR_LEN: usize = 200;

/// Condense an API error body into a single line fit for a ray's issue slot.
fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API error (empty response body)".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("API error: {summary}");
            }
        }
    }

    let mut collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > MAX_ERROR_LEN {
        let cut = collapsed
            .char_indices()
            .take_while(|(i, _)| *i < MAX_ERROR_LEN)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        collapsed.truncate(cut);
        collapsed.push('…');
    }
    format!("API error: {collapsed}")
}

fn add_auth_headers(
    request: reqwest::RequestBuilder,
    provider_name: &str,
    api_key: &str,
) -> reqwest::RequestBuilder {
    if let Some(builtin) = find_builtin_provider(provider_name) {
        if builtin.is_anthropic_mode() {
            return request
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01");
        }
    }
    request.header("Authorization", format!("Bearer {api_key}"))
}

/// Production [`StreamDispatcher`]: one tokio task per ray, POSTing an SSE
/// chat-completion request and reporting progress over a shared channel.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<RayStreamEvent>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RayStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamDispatcher for ChatStreamService {
    fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                provider_name,
                model,
                api_messages,
                cancel_token,
                ray_id,
                generation,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
            };

            let send = |message: StreamMessage| {
                let _ = tx_clone.send(RayStreamEvent {
                    ray_id,
                    generation,
                    message,
                });
            };

            tokio::select! {
                _ = async {
                    let chat_url = construct_api_url(&base_url, "chat/completions");
                    let http_request = client
                        .post(chat_url)
                        .header("Content-Type", "application/json");

                    let http_request = add_auth_headers(http_request, &provider_name, &api_key);

                    match http_request.json(&request).send().await {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let error_text = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "<no body>".to_string());
                                send(StreamMessage::Error(format_api_error(&error_text)));
                                send(StreamMessage::End);
                                return;
                            }

                            let mut stream = response.bytes_stream();
                            let mut buffer: Vec<u8> = Vec::new();

                            while let Some(chunk) = stream.next().await {
                                if cancel_token.is_cancelled() {
                                    return;
                                }

                                if let Ok(chunk_bytes) = chunk {
                                    buffer.extend_from_slice(&chunk_bytes);

                                    while let Some(newline_pos) = memchr(b'\n', &buffer) {
                                        let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                                            Ok(s) => s.trim(),
                                            Err(e) => {
                                                tracing::debug!("invalid UTF-8 in stream: {e}");
                                                buffer.drain(..=newline_pos);
                                                continue;
                                            }
                                        };

                                        let should_end = process_sse_line(
                                            line_str,
                                            &tx_clone,
                                            ray_id,
                                            generation,
                                        );
                                        buffer.drain(..=newline_pos);
                                        if should_end {
                                            return;
                                        }
                                    }
                                }
                            }

                            send(StreamMessage::End);
                        }
                        Err(e) => {
                            send(StreamMessage::Error(format_api_error(&e.to_string())));
                            send(StreamMessage::End);
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::beam::ray::RayId;

    const RAY: RayId = RayId(7);

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (service, mut rx) = ChatStreamService::new();
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (index, (chunk_line, expected_chunk, done_line)) in variants.iter().enumerate() {
            let generation = (index + 1) as u64;

            assert!(!process_sse_line(chunk_line, &service.tx, RAY, generation));
            let event = rx.try_recv().expect("expected chunk event");
            assert_eq!(event.ray_id, RAY);
            assert_eq!(event.generation, generation);
            match event.message {
                StreamMessage::Chunk(content) => assert_eq!(content, *expected_chunk),
                other => panic!("expected chunk event, got {:?}", other),
            }

            assert!(process_sse_line(done_line, &service.tx, RAY, generation));
            let event = rx.try_recv().expect("expected end event");
            assert!(matches!(event.message, StreamMessage::End));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn process_sse_line_routes_stream_errors() {
        let (service, mut rx) = ChatStreamService::new();
        let error_line = r#"data: {"error":{"message":"internal server error"}}"#;

        assert!(process_sse_line(error_line, &service.tx, RAY, 3));

        let event = rx.try_recv().expect("expected error event");
        assert_eq!(event.generation, 3);
        match event.message {
            StreamMessage::Error(text) => {
                assert_eq!(text, "API error: internal server error");
            }
            other => panic!("expected error event, got {:?}", other),
        }

        let event = rx.try_recv().expect("expected end event");
        assert!(matches!(event.message, StreamMessage::End));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (service, mut rx) = ChatStreamService::new();
        assert!(!process_sse_line(": keepalive", &service.tx, RAY, 1));
        assert!(!process_sse_line("event: ping", &service.tx, RAY, 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn format_api_error_extracts_json_summary() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(format_api_error(raw), "API error: model overloaded");

        let string_error = r#"{"error":"quota exceeded"}"#;
        assert_eq!(format_api_error(string_error), "API error: quota exceeded");

        let top_level = r#"{"message":"not found"}"#;
        assert_eq!(format_api_error(top_level), "API error: not found");
    }

    #[test]
    fn format_api_error_collapses_and_truncates_plaintext() {
        assert_eq!(
            format_api_error("  upstream\n  timed out  "),
            "API error: upstream timed out"
        );

        let long = "x".repeat(500);
        let formatted = format_api_error(&long);
        assert!(formatted.len() < 500);
        assert!(formatted.ends_with('…'));
    }

    #[test]
    fn format_api_error_handles_empty_body() {
        assert_eq!(format_api_error("   "), "API error (empty response body)");
    }
}
