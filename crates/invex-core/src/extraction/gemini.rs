//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ExtractionModel;
use crate::error::{ApiError, InvexError, Result};
use crate::models::config::{GeminiConfig, InvexConfig};
use crate::normalize::PageImage;

/// Client for the Generative Language API.
///
/// No retries: every failure is surfaced to the caller as is.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl GeminiClient {
    /// Build a client from explicit settings.
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| InvexError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.api_base.trim_end_matches('/'),
                config.model
            ),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }

    /// Build a client, reading the API key from the environment.
    pub fn from_config(config: &InvexConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(&config.gemini, api_key)
    }

    fn build_request<'a>(&self, prompt: &'a str, pages: &'a [PageImage]) -> GenerateContentRequest<'a> {
        let mut parts = Vec::with_capacity(pages.len() + 1);
        parts.push(Part {
            text: Some(prompt),
            inline_data: None,
        });
        for page in pages {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: page.mime_type,
                    data: general_purpose::STANDARD.encode(&page.data),
                }),
            });
        }

        GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: self
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        }
    }
}

#[async_trait]
impl ExtractionModel for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, pages: &[PageImage]) -> Result<String> {
        info!("Sending {} page image(s) to {}", pages.len(), self.model);
        let request = self.build_request(prompt, pages);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status, &body).into());
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Token usage: prompt={:?} candidates={:?} total={:?}",
                usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
            );
        }

        response_text(parsed)
    }
}

/// Map a non-success HTTP response to an [`ApiError`].
fn classify_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        // Gemini reports a bad key as 400 INVALID_ARGUMENT
        StatusCode::BAD_REQUEST if message.contains("API key") => ApiError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(message),
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(InvexError::EmptyResponse(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| InvexError::EmptyResponse("no candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(InvexError::EmptyResponse(format!(
            "no text in response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, http::HeaderMap, routing::post};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    type Captured = Arc<Mutex<Option<(Option<String>, Value)>>>;

    /// Serve a canned Gemini reply on a local port.
    async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        let app = Router::new().route(
            "/models/{action}",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = sink.clone();
                let reply = reply.clone();
                async move {
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *sink.lock().unwrap() = Some((key, body));
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), captured)
    }

    fn client_for(base: &str) -> GeminiClient {
        let config = GeminiConfig {
            api_base: base.to_string(),
            ..GeminiConfig::default()
        };
        GeminiClient::new(&config, "test-key").unwrap()
    }

    fn page(data: &[u8]) -> PageImage {
        PageImage {
            mime_type: "image/png",
            data: data.to_vec(),
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
        })
    }

    #[test]
    fn test_request_shape() {
        let client = client_for("http://localhost");
        let pages = vec![page(b"one"), page(b"two")];
        let request = serde_json::to_value(client.build_request("prompt", &pages)).unwrap();

        let parts = request["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({"text": "prompt"}));
        assert_eq!(
            parts[2],
            json!({"inlineData": {"mimeType": "image/png", "data": "dHdv"}})
        );
        assert!(request.get("generationConfig").is_none());
    }

    #[test]
    fn test_endpoint_url() {
        let client = client_for("https://example.test/v1beta/");
        assert_eq!(
            client.endpoint,
            "https://example.test/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn test_classify_error() {
        let bad_key = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, bad_key),
            ApiError::Unauthorized { status: 400, .. }
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, "{}"),
            ApiError::RateLimited(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, "denied"),
            ApiError::Unauthorized { status: 403, .. }
        ));
        match classify_error(StatusCode::INTERNAL_SERVER_ERROR, "oops") {
            ApiError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_response_text_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "{\"a\": "},
                    {"text": "1}"}
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_blocked_prompt_is_empty_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(matches!(response_text(response), Err(InvexError::EmptyResponse(_))));
    }

    #[tokio::test]
    async fn test_generate_sends_all_pages_in_one_request() {
        let (base, captured) = spawn_stub(StatusCode::OK, text_reply("{\"ok\": true}")).await;
        let client = client_for(&base);

        let text = client
            .generate("prompt", &[page(b"p1"), page(b"p2")])
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\": true}");

        let (key, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(key.as_deref(), Some("test-key"));
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_generate_empty_text() {
        let (base, _) = spawn_stub(StatusCode::OK, text_reply("   ")).await;
        let result = client_for(&base).generate("prompt", &[page(b"p1")]).await;
        assert!(matches!(result, Err(InvexError::EmptyResponse(_))));
    }

    #[tokio::test]
    async fn test_generate_rate_limited() {
        let reply = json!({"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}});
        let (base, _) = spawn_stub(StatusCode::TOO_MANY_REQUESTS, reply).await;
        let result = client_for(&base).generate("prompt", &[page(b"p1")]).await;
        assert!(matches!(
            result,
            Err(InvexError::Api(ApiError::RateLimited(ref m))) if m == "Resource has been exhausted"
        ));
    }

    #[tokio::test]
    async fn test_generate_network_failure() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client_for(&format!("http://{}", addr))
            .generate("prompt", &[page(b"p1")])
            .await;
        assert!(matches!(result, Err(InvexError::Api(ApiError::Network(_)))));
    }
}
