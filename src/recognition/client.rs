use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

/// Payloads smaller than this are camera warm-up noise and never sent.
pub const MIN_IMAGE_BYTES: usize = 50;

/// Instruction sent alongside every frame.
pub const PLATE_PROMPT: &str = "Identify every vehicle license plate visible in this image. \
Only report French plates: the current SIV format (two letters, three digits, two letters, \
e.g. AA-123-AA) or the legacy FNI format (digits, letters, department, e.g. 1234 AB 75). \
Ignore any other text. Answer with JSON of the form {\"plates\": [\"AA-123-AA\"]} and an \
empty array when no plate is readable.";

/// One frame plus the fixed instruction, ready for a backend.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub jpeg: Arc<Vec<u8>>,
    pub prompt: &'static str,
}

/// Failure reported by a backend before any response text was produced.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend quota exhausted: {0}")]
    Quota(String),

    #[error("backend request failed: {0}")]
    Other(String),
}

/// A multimodal model that turns an image plus instruction into JSON text
/// shaped like `{ "plates": [...] }`.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn generate(&self, request: RecognitionRequest) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// The backend is throttling us. Callers surface this separately.
    #[error("recognition quota exceeded")]
    QuotaExceeded,

    /// Anything else; the caller treats it as an empty result.
    #[error("recognition failed: {0}")]
    Transient(String),
}

impl From<BackendError> for RecognitionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Quota(_) => RecognitionError::QuotaExceeded,
            BackendError::Other(message) => RecognitionError::Transient(message),
        }
    }
}

/// Wraps exactly one backend call per frame. No retries: the capture
/// loop's fixed period is the only retry policy.
#[derive(Clone)]
pub struct RecognitionClient {
    backend: Arc<dyn RecognitionBackend>,
}

impl RecognitionClient {
    pub fn new(backend: Arc<dyn RecognitionBackend>) -> Self {
        Self { backend }
    }

    pub async fn recognize(&self, jpeg: Vec<u8>) -> Result<Vec<String>, RecognitionError> {
        if jpeg.len() < MIN_IMAGE_BYTES {
            debug!("Skipping recognition: frame is only {} bytes", jpeg.len());
            return Ok(Vec::new());
        }

        let request = RecognitionRequest {
            jpeg: Arc::new(jpeg),
            prompt: PLATE_PROMPT,
        };

        match self.backend.generate(request).await {
            Ok(text) => Ok(parse_plates(&text)),
            Err(err) => {
                warn!("{err}");
                Err(err.into())
            }
        }
    }
}

/// Lenient reader for `{ "plates": [...] }`. Anything else is "no plates".
pub fn parse_plates(text: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
        warn!("Recognition response is not JSON; treating as empty");
        return Vec::new();
    };

    match value.get("plates") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        reply: fn() -> Result<String, BackendError>,
    }

    #[async_trait]
    impl RecognitionBackend for Scripted {
        async fn generate(&self, request: RecognitionRequest) -> Result<String, BackendError> {
            assert_eq!(request.prompt, PLATE_PROMPT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn client(reply: fn() -> Result<String, BackendError>) -> (Arc<Scripted>, RecognitionClient) {
        let backend = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            reply,
        });
        (backend.clone(), RecognitionClient::new(backend))
    }

    #[tokio::test]
    async fn tiny_payload_never_reaches_backend() {
        let (backend, client) = client(|| Ok(r#"{"plates":["AB-123-CD"]}"#.into()));

        assert_eq!(client.recognize(Vec::new()).await, Ok(vec![]));
        assert_eq!(client.recognize(vec![0xFF; 49]).await, Ok(vec![]));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let plates = client.recognize(vec![0xFF; 50]).await.unwrap();
        assert_eq!(plates, vec!["AB-123-CD".to_string()]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_is_a_distinct_signal() {
        let (_, client) = client(|| Err(BackendError::Quota("429".into())));
        assert_eq!(
            client.recognize(vec![1; 128]).await,
            Err(RecognitionError::QuotaExceeded)
        );
    }

    #[tokio::test]
    async fn other_failures_are_transient() {
        let (_, client) = client(|| Err(BackendError::Other("connection reset".into())));
        assert_eq!(
            client.recognize(vec![1; 128]).await,
            Err(RecognitionError::Transient("connection reset".into()))
        );
    }

    #[test]
    fn malformed_success_bodies_yield_nothing() {
        assert!(parse_plates("").is_empty());
        assert!(parse_plates("not json").is_empty());
        assert!(parse_plates("{}").is_empty());
        assert!(parse_plates(r#"{"plates": "AB-123-CD"}"#).is_empty());
        assert!(parse_plates(r#"{"plates": null}"#).is_empty());
        assert!(parse_plates("[]").is_empty());
    }

    #[test]
    fn keeps_only_string_items() {
        let plates = parse_plates(r#" {"plates": ["AB-123-CD", 42, null, "1234 AB 75"]} "#);
        assert_eq!(plates, vec!["AB-123-CD", "1234 AB 75"]);
    }
}
