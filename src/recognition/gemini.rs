//! Gemini `generateContent` backend.
//!
//! Sends the frame as inline base64 JPEG together with the plate prompt and
//! pins the response to the `{ "plates": string[] }` schema.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::settings::RecognitionSettings;

use super::client::{BackendError, RecognitionBackend, RecognitionRequest};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    settings: RecognitionSettings,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiBackend {
    pub fn new(api_key: String, settings: RecognitionSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            settings,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl RecognitionBackend for GeminiBackend {
    async fn generate(&self, request: RecognitionRequest) -> Result<String, BackendError> {
        let body = request_body(&request, &self.settings);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::Other(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| BackendError::Other(err.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        Ok(success_text(&text))
    }
}

/// Model text from a 2xx body. An envelope that does not parse counts as
/// "nothing recognized", not as a backend failure.
pub(crate) fn success_text(body: &str) -> String {
    match serde_json::from_str::<GenerateResponse>(body) {
        Ok(parsed) => response_text(parsed),
        Err(err) => {
            warn!("Unexpected generateContent response shape: {err}");
            String::new()
        }
    }
}

pub(crate) fn request_body(request: &RecognitionRequest, settings: &RecognitionSettings) -> Value {
    let mut generation_config = json!({
        "responseMimeType": "application/json",
        "responseSchema": {
            "type": "OBJECT",
            "properties": {
                "plates": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" }
                }
            },
            "required": ["plates"]
        }
    });

    if settings.disable_deep_reasoning {
        generation_config["thinkingConfig"] = json!({ "thinkingBudget": 0 });
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": "image/jpeg",
                        "data": STANDARD.encode(request.jpeg.as_slice())
                    }
                },
                { "text": request.prompt }
            ]
        }],
        "generationConfig": generation_config
    })
}

/// Concatenated text parts of the first candidate; empty when there is none.
fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub(crate) fn classify_failure(status: StatusCode, body: &str) -> BackendError {
    let summary = format!("HTTP {}: {}", status.as_u16(), body.trim());
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("resource_exhausted")
        || lowered.contains("quota")
    {
        BackendError::Quota(summary)
    } else {
        BackendError::Other(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::client::PLATE_PROMPT;
    use std::sync::Arc;

    fn request(bytes: &[u8]) -> RecognitionRequest {
        RecognitionRequest {
            jpeg: Arc::new(bytes.to_vec()),
            prompt: PLATE_PROMPT,
        }
    }

    #[test]
    fn body_carries_image_prompt_and_schema() {
        let settings = RecognitionSettings::default();
        let body = request_body(&request(b"jpeg"), &settings);

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "anBlZw==");
        assert_eq!(parts[1]["text"], PLATE_PROMPT);

        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(
            config["responseSchema"]["properties"]["plates"]["type"],
            "ARRAY"
        );
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], 0);
    }

    #[test]
    fn deep_reasoning_knob_is_configurable() {
        let settings = RecognitionSettings {
            disable_deep_reasoning: false,
            ..RecognitionSettings::default()
        };
        let body = request_body(&request(b"jpeg"), &settings);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }

    #[test]
    fn classifies_quota_failures() {
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            BackendError::Quota(_)
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::FORBIDDEN,
                r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#
            ),
            BackendError::Quota(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "invalid image"),
            BackendError::Other(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, ""),
            BackendError::Other(_)
        ));
    }

    #[test]
    fn malformed_success_body_is_empty_text() {
        assert_eq!(success_text("<html>gateway</html>"), "");
        assert_eq!(success_text(r#"{"candidates":"nope"}"#), "");
        assert_eq!(success_text("{}"), "");
        assert_eq!(
            success_text(r#"{"candidates":[{"content":{"parts":[{"text":"{\"plates\":[]}"}]}}]}"#),
            r#"{"plates":[]}"#
        );
    }

    #[tokio::test]
    async fn malformed_success_body_recognizes_nothing() {
        struct Garbled;

        #[async_trait]
        impl RecognitionBackend for Garbled {
            async fn generate(&self, _request: RecognitionRequest) -> Result<String, BackendError> {
                Ok(success_text("not json at all"))
            }
        }

        let client = crate::recognition::RecognitionClient::new(Arc::new(Garbled));
        assert_eq!(client.recognize(vec![0u8; 256]).await, Ok(vec![]));
    }

    #[test]
    fn extracts_first_candidate_text() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"plates\":"},{"text":"[\"AB-123-CD\"]}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(parsed), r#"{"plates":["AB-123-CD"]}"#);

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response_text(empty), "");
    }

    #[test]
    fn url_joins_endpoint_and_model() {
        let backend = GeminiBackend::new(
            "key".into(),
            RecognitionSettings {
                endpoint: "https://example.test/v1beta/".into(),
                model: "gemini-2.5-flash".into(),
                ..RecognitionSettings::default()
            },
        );
        assert_eq!(
            backend.url(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
