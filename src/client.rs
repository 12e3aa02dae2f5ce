//! The AI gateway client: per-call-kind orchestration over the provider
//! layer.
//!
//! Three call kinds, each its own small state machine:
//! - `analyze_word`: one non-streaming structured request
//! - `analyze_sentence`: streaming-first with transparent non-streaming
//!   fallback, structured parse at the end
//! - `chat`: plain text, with genuine or simulated incremental delivery
//!
//! The client performs no retries, caching or rate limiting; callers own
//! those policies.

use crate::analysis::{SentenceAnalysis, WordAnalysis};
use crate::error::AiError;
use crate::extract::{extract_json, snippet};
use crate::message::ChatMessage;
use crate::preferences::Preferences;
use crate::provider::config::{self, ProviderConfig};
use crate::provider::request::{self, RequestOptions};
use crate::provider::shape;
use crate::provider::stream::StreamDecoder;
use crate::templates::{Templates, CHAT_SYSTEM_PROMPT};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sink receiving (delta, accumulated) pairs during sentence streaming.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(&str, &str) + Send);

/// Sink receiving each chat delta.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Simulated-stream slice size, in characters.
const SIMULATED_CHUNK_CHARS: usize = 10;
/// Pause between simulated slices.
const SIMULATED_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Fixed per-call-kind deadlines. Chat has no enforced deadline beyond
/// transport defaults.
#[derive(Debug, Clone)]
pub struct Deadlines {
    pub word: Duration,
    pub sentence: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            word: Duration::from_secs(30),
            sentence: Duration::from_secs(60),
        }
    }
}

/// Cancellation token bound to a wall-clock deadline. The timer task is
/// aborted on drop, so no timer outlives its call on any exit path.
struct CallDeadline {
    after: Duration,
    cancel: CancellationToken,
    timer: tokio::task::JoinHandle<()>,
}

impl CallDeadline {
    fn start(after: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
        Self {
            after,
            cancel,
            timer,
        }
    }

    /// Race `fut` against the deadline. Expiry drops the future, which
    /// aborts the underlying transport, and yields a Timeout error.
    async fn run<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AiError>>,
    ) -> Result<T, AiError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AiError::Timeout(self.after)),
            result = fut => result,
        }
    }
}

impl Drop for CallDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Multi-provider AI gateway client.
pub struct AiClient {
    prefs: Arc<dyn Preferences>,
    http: reqwest::Client,
    templates: Templates,
    deadlines: Deadlines,
}

impl AiClient {
    /// Create a client reading provider settings through `prefs`.
    pub fn new(prefs: Arc<dyn Preferences>) -> Result<Self, AiError> {
        Self::with_deadlines(prefs, Deadlines::default())
    }

    /// Create a client with non-default deadlines.
    pub fn with_deadlines(
        prefs: Arc<dyn Preferences>,
        deadlines: Deadlines,
    ) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            // Don't keep connections alive between calls.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|err| AiError::Transport {
                status: None,
                body: format!("failed to build HTTP client: {err}"),
            })?;

        Ok(Self {
            prefs,
            http,
            templates: Templates::new(),
            deadlines,
        })
    }

    /// Analyze a single vocabulary word. Non-streaming, 30 s deadline.
    pub async fn analyze_word(&self, word: &str) -> Result<WordAnalysis, AiError> {
        let config = config::resolve(self.prefs.as_ref());
        self.require_api_key(&config)?;

        let messages = vec![ChatMessage::user(self.templates.word_analysis(word)?)];
        let options = RequestOptions {
            stream: false,
            temperature: 0.3,
            max_tokens: Some(500),
            json_object: true,
        };

        let start = std::time::Instant::now();
        tracing::info!(target: "llm", model = %config.model, provider = config.provider.id(), "analyzing word");

        let deadline = CallDeadline::start(self.deadlines.word);
        let text = deadline
            .run(self.request_text(&config, &messages, &options))
            .await?;

        let result = parse_structured::<WordAnalysis>(&text);
        tracing::info!(
            target: "llm",
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "word analysis finished"
        );
        result
    }

    /// Analyze a learner-written sentence. Tries a streaming request first
    /// (forwarding raw text deltas to `on_chunk`); any streaming failure
    /// falls back to a full non-streaming reissue with a 60 s deadline.
    /// Structured parsing runs exactly once, on the winning text.
    pub async fn analyze_sentence(
        &self,
        sentence: &str,
        stream: bool,
        on_chunk: Option<ProgressSink<'_>>,
    ) -> Result<SentenceAnalysis, AiError> {
        let config = config::resolve(self.prefs.as_ref());
        self.require_api_key(&config)?;

        let messages = vec![ChatMessage::user(self.templates.sentence_analysis(sentence)?)];
        let options = RequestOptions {
            stream: true,
            temperature: 0.3,
            max_tokens: Some(2000),
            json_object: true,
        };

        let streamed = if stream {
            match self.stream_sentence(&config, &messages, &options, on_chunk).await {
                Ok(text) => Some(text),
                Err(err) => {
                    tracing::warn!(target: "llm", error = %err, "streaming failed, falling back to non-streaming");
                    None
                }
            }
        } else {
            None
        };

        let text = match streamed {
            Some(text) => text,
            None => {
                let options = RequestOptions {
                    stream: false,
                    ..options
                };
                let deadline = CallDeadline::start(self.deadlines.sentence);
                deadline
                    .run(self.request_text(&config, &messages, &options))
                    .await?
            }
        };

        parse_structured::<SentenceAnalysis>(&text)
    }

    /// Open chat with the fixed assistant instruction. Non-streaming calls
    /// return the normalized text; streaming calls deliver everything
    /// through `on_chunk` (mandatory) and return an empty string, except
    /// when the provider cannot stream, in which case delivery is simulated
    /// over the full response and the text is also returned.
    pub async fn chat(
        &self,
        message: &str,
        stream: bool,
        on_chunk: Option<ChunkSink<'_>>,
    ) -> Result<String, AiError> {
        if !stream {
            return self.chat_blocking(message).await;
        }

        let Some(sink) = on_chunk else {
            return Err(AiError::Usage(
                "a chunk sink is required for streaming chat".to_string(),
            ));
        };
        self.chat_streaming(message, sink).await
    }

    async fn chat_blocking(&self, message: &str) -> Result<String, AiError> {
        let config = config::resolve(self.prefs.as_ref());
        self.require_api_key(&config)?;

        let response = self
            .send(&config, &chat_messages(message), &RequestOptions::default())
            .await?;
        let document: Value = response.json().await?;
        Ok(shape::normalize(&document)?.trim().to_string())
    }

    async fn chat_streaming(&self, message: &str, sink: ChunkSink<'_>) -> Result<String, AiError> {
        let config = config::resolve(self.prefs.as_ref());
        self.require_api_key(&config)?;

        let options = RequestOptions {
            stream: true,
            ..RequestOptions::default()
        };
        let response = self.send(&config, &chat_messages(message), &options).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_event_stream(&content_type) {
            // Provider answered with a single document; synthesize the
            // incremental-delivery contract over it.
            tracing::debug!(target: "llm", content_type, "no streaming transport, simulating chunked delivery");
            let document: Value = response.json().await?;
            let text = shape::normalize(&document)?;
            for piece in char_slices(&text, SIMULATED_CHUNK_CHARS) {
                sink(piece);
                tokio::time::sleep(SIMULATED_CHUNK_DELAY).await;
            }
            return Ok(text);
        }

        // Genuine stream: chat callers rely solely on delivered chunks.
        let mut forward = |delta: &str, _accumulated: &str| sink(delta);
        self.read_stream(response, &mut forward).await?;
        Ok(String::new())
    }

    /// Streaming sentence request: decode the body, forwarding raw deltas,
    /// and return the accumulated text.
    async fn stream_sentence(
        &self,
        config: &ProviderConfig,
        messages: &[ChatMessage],
        options: &RequestOptions,
        mut on_chunk: Option<ProgressSink<'_>>,
    ) -> Result<String, AiError> {
        let response = self.send(config, messages, options).await?;
        let mut forward = |delta: &str, accumulated: &str| {
            if let Some(sink) = on_chunk.as_mut() {
                sink(delta, accumulated);
            }
        };
        self.read_stream(response, &mut forward).await
    }

    /// Drain a verified-2xx streaming response through a [`StreamDecoder`].
    async fn read_stream(
        &self,
        response: reqwest::Response,
        sink: &mut dyn FnMut(&str, &str),
    ) -> Result<String, AiError> {
        let mut body = response.bytes_stream();
        let mut decoder = StreamDecoder::new();

        while let Some(chunk) = body.next().await {
            let bytes = chunk?;
            decoder.push(&bytes, sink);
        }

        Ok(decoder.finish())
    }

    /// Issue one POST and verify the status. Non-2xx responses become
    /// Transport errors carrying the status and best-effort body text.
    async fn send(
        &self,
        config: &ProviderConfig,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<reqwest::Response, AiError> {
        let url = request::endpoint(config)?;
        let headers = request::headers(config)?;
        let body = request::body(config, messages, options);

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Transport {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(response)
    }

    /// Non-streaming request returning the normalized assistant text.
    async fn request_text(
        &self,
        config: &ProviderConfig,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<String, AiError> {
        let response = self.send(config, messages, options).await?;
        let document: Value = response.json().await?;
        shape::normalize(&document)
    }

    fn require_api_key(&self, config: &ProviderConfig) -> Result<(), AiError> {
        if config.provider.requires_api_key() && config.api_key.is_empty() {
            return Err(AiError::missing_api_key(config.provider.display_name()));
        }
        Ok(())
    }
}

fn chat_messages(message: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CHAT_SYSTEM_PROMPT),
        ChatMessage::user(message),
    ]
}

fn is_event_stream(content_type: &str) -> bool {
    content_type.contains("text/event-stream") || content_type.contains("application/x-ndjson")
}

/// Run the span extraction once and deserialize into the target model.
fn parse_structured<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|err| AiError::MalformedStructuredResponse {
        reason: err.to_string(),
        snippet: snippet(text),
    })
}

/// Split `text` into consecutive slices of at most `size` characters,
/// respecting char boundaries.
fn char_slices(text: &str, size: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            slices.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Marker response that keeps the connection open without answering.
    const HANG: &str = "HANG";

    /// Serve canned HTTP responses, one connection each, and return the
    /// base URL.
    async fn serve(responses: Vec<String>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 16384];
                let _ = socket.read(&mut buf).await;
                if response == HANG {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                } else {
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}")
    }

    fn http_json(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn http_error(status: u16, body: &str) -> String {
        format!(
            "HTTP/1.1 {status} Error\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn http_sse(frames: &[serde_json::Value]) -> String {
        let mut body = String::new();
        for frame in frames {
            body.push_str(&format!("data: {frame}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{body}"
        )
    }

    fn local_client(host: &str) -> AiClient {
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "ollama-local")
            .set("ollamaLocalHost", host);
        AiClient::new(Arc::new(prefs)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_request() {
        // If a request were issued, the unroutable host would surface as a
        // Transport error instead.
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "openai")
            .set("openaiEndpoint", "http://127.0.0.1:1");
        let client = AiClient::new(Arc::new(prefs)).unwrap();

        let err = client.analyze_word("ubiquitous").await.unwrap_err();
        assert!(matches!(err, AiError::Configuration { ref provider } if provider == "OpenAI"));

        let err = client.chat("hi", false, None).await.unwrap_err();
        assert!(matches!(err, AiError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_analyze_word_extracts_structured_result() {
        let analysis = json!({
            "definition": "có mặt ở khắp nơi",
            "word_type": "adjective",
            "cefr_level": "C1",
            "ipa_pronunciation": "/juːˈbɪkwɪtəs/",
            "example_sentence": "Smartphones are ubiquitous."
        });
        let content = format!("Sure! Here is the JSON:\n{analysis}\nHope that helps.");
        let document = json!({"message": {"content": content}}).to_string();
        let host = serve(vec![http_json(&document)]).await;

        let result = local_client(&host).analyze_word("ubiquitous").await.unwrap();
        assert_eq!(result.cefr_level, "C1");
        assert_eq!(result.definition, "có mặt ở khắp nơi");
    }

    #[tokio::test]
    async fn test_sentence_streaming_delivers_deltas() {
        let response = http_sse(&[
            json!({"message": {"content": "{\"score\": "}}),
            json!({"message": {"content": "9.0, \"overall_feedback\": \"tốt\"}"}}),
        ]);
        let host = serve(vec![response]).await;

        let mut deltas = Vec::new();
        let mut sink = |delta: &str, _acc: &str| deltas.push(delta.to_string());
        let result = local_client(&host)
            .analyze_sentence("She sings well.", true, Some(&mut sink))
            .await
            .unwrap();

        assert_eq!(result.score, 9.0);
        assert_eq!(result.overall_feedback, "tốt");
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas.concat(), "{\"score\": 9.0, \"overall_feedback\": \"tốt\"}");
    }

    #[tokio::test]
    async fn test_sentence_falls_back_when_streaming_fails() {
        let analysis = json!({"score": 8.0, "overall_feedback": "ổn", "strengths": ["rõ ràng"]});
        let document = json!({"message": {"content": analysis.to_string()}}).to_string();
        let host = serve(vec![http_error(500, "stream broken"), http_json(&document)]).await;

        let mut deltas = Vec::new();
        let mut sink = |delta: &str, _acc: &str| deltas.push(delta.to_string());
        let result = local_client(&host)
            .analyze_sentence("He go to school.", true, Some(&mut sink))
            .await
            .unwrap();

        assert_eq!(result.score, 8.0);
        assert_eq!(result.strengths, vec!["rõ ràng"]);
        // The failed streaming attempt delivered nothing.
        assert!(deltas.is_empty());
    }

    #[tokio::test]
    async fn test_chat_streaming_requires_sink() {
        let client = local_client("http://127.0.0.1:1");
        let err = client.chat("hello", true, None).await.unwrap_err();
        assert!(matches!(err, AiError::Usage(_)));
    }

    #[tokio::test]
    async fn test_chat_non_streaming_returns_trimmed_text() {
        let document = json!({"message": {"content": "  Hello learner!\n"}}).to_string();
        let host = serve(vec![http_json(&document)]).await;

        let text = local_client(&host).chat("hi", false, None).await.unwrap();
        assert_eq!(text, "Hello learner!");
    }

    #[tokio::test]
    async fn test_chat_simulates_streaming_over_plain_json() {
        let full = "Xin chào! Đây là một câu trả lời khá dài để cắt lát.";
        let document = json!({"message": {"content": full}}).to_string();
        let host = serve(vec![http_json(&document)]).await;

        let mut pieces = Vec::new();
        let mut sink = |delta: &str| pieces.push(delta.to_string());
        let text = local_client(&host)
            .chat("hi", true, Some(&mut sink))
            .await
            .unwrap();

        assert_eq!(text, full);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 10));
        assert_eq!(pieces.concat(), full);
    }

    #[tokio::test]
    async fn test_chat_decodes_genuine_stream() {
        let response = http_sse(&[
            json!({"message": {"content": "Hel"}}),
            json!({"message": {"content": "lo"}}),
        ]);
        let host = serve(vec![response]).await;

        let mut pieces = Vec::new();
        let mut sink = |delta: &str| pieces.push(delta.to_string());
        let text = local_client(&host)
            .chat("hi", true, Some(&mut sink))
            .await
            .unwrap();

        // Chat callers rely on the chunks, not the return value.
        assert_eq!(text, "");
        assert_eq!(pieces, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout_not_transport() {
        let host = serve(vec![HANG.to_string()]).await;
        let prefs = MemoryPreferences::new()
            .set("aiProvider", "ollama-local")
            .set("ollamaLocalHost", &host);
        let deadlines = Deadlines {
            word: Duration::from_millis(200),
            sentence: Duration::from_millis(200),
        };
        let client = AiClient::with_deadlines(Arc::new(prefs), deadlines).unwrap();

        let err = client.analyze_word("slow").await.unwrap_err();
        assert!(matches!(err, AiError::Timeout(d) if d == Duration::from_millis(200)));
    }

    #[test]
    fn test_char_slices_respects_boundaries() {
        let text = "ười ngươi ười ngươi";
        let slices = char_slices(text, 10);
        assert!(slices.iter().all(|s| s.chars().count() <= 10));
        assert_eq!(slices.concat(), text);

        assert!(char_slices("", 10).is_empty());
        assert_eq!(char_slices("short", 10), vec!["short"]);
    }
}
