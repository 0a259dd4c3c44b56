//! Google Gemini provider (Generative Language API, API-key auth).
//!
//! `POST {base_url}/v1beta/models/{model}:generateContent` with the key in
//! the `x-goog-api-key` header. The model comes from the request so one
//! provider instance can serve the primary and fallback models.

use async_trait::async_trait;
use hojokin_core::config::GeminiConfig;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, Role};
use crate::retry::MAX_RETRY_AFTER_MS;

/// Used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_MS: u64 = 5000;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &GeminiConfig) -> Self {
        Self::new(cfg.api_key.clone(), cfg.base_url.clone())
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

/// Build the generateContent request body.
fn build_body(req: &ChatRequest) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                Role::User => "user",
            };
            serde_json::json!({
                "role": role,
                "parts": [{ "text": m.content }]
            })
        })
        .collect();

    let mut generation_config = serde_json::json!({
        "maxOutputTokens": req.max_tokens,
    });
    if let Some(t) = req.temperature {
        generation_config["temperature"] = serde_json::json!(t);
    }

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": generation_config,
    });
    if !req.system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": req.system }]
        });
    }
    body
}

/// Turn a decoded response into a `ChatResponse`. No candidates usually
/// means the prompt was blocked; that is reported as a parse error.
fn parse_response(api_resp: GeminiResponse, model: &str) -> Result<ChatResponse, ProviderError> {
    let Some(candidate) = api_resp.candidates.into_iter().next() else {
        let reason = api_resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ProviderError::Parse(format!("empty response from Gemini: {reason}")));
    };

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let usage = api_resp.usage_metadata.unwrap_or_default();

    Ok(ChatResponse {
        content,
        model: api_resp.model_version.unwrap_or_else(|| model.to_string()),
        tokens_in: usage.prompt_token_count,
        tokens_out: usage.candidates_token_count,
        stop_reason: candidate.finish_reason.unwrap_or_default(),
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.endpoint(&req.model);
        let body = build_body(req);

        debug!(model = %req.model, "sending request to Gemini");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s.saturating_mul(1000).min(MAX_RETRY_AFTER_MS))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_response(api_resp, &req.model)
    }
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<PromptFeedback>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gemini-test".to_string(),
            system: "あなたは補助金申請の専門家です。".to_string(),
            messages: vec![
                Message::user("事業概要を書いてください"),
                Message {
                    role: Role::Assistant,
                    content: "承知しました".to_string(),
                },
            ],
            max_tokens: 512,
            temperature: Some(0.4),
        }
    }

    #[test]
    fn body_maps_roles_and_system_instruction() {
        let body = build_body(&request());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "あなたは補助金申請の専門家です。"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn body_omits_empty_system_and_temperature() {
        let mut req = request();
        req.system.clear();
        req.temperature = None;
        let body = build_body(&req);
        assert!(body.get("systemInstruction").is_none());
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn parses_candidates_and_usage() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "当社は" }, { "text": "精密加工を" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 40 }
        });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        let out = parse_response(resp, "gemini-test").unwrap();
        assert_eq!(out.content, "当社は精密加工を");
        assert_eq!(out.model, "gemini-test");
        assert_eq!((out.tokens_in, out.tokens_out), (120, 40));
        assert_eq!(out.stop_reason, "STOP");
    }

    #[test]
    fn blocked_prompt_is_parse_error() {
        let raw = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let resp: GeminiResponse = serde_json::from_value(raw).unwrap();
        match parse_response(resp, "m") {
            Err(ProviderError::Parse(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn sends_key_header_and_reads_reply() {
        let app = Router::new().route(
            "/v1beta/models/{model}",
            post(|headers: HeaderMap| async move {
                if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("k-123") {
                    return (StatusCode::FORBIDDEN, Json(serde_json::json!({})));
                }
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "candidates": [{ "content": { "parts": [{ "text": "下書き" }] } }]
                    })),
                )
            }),
        );
        let base = serve(app).await;
        let provider = GeminiProvider::new("k-123", format!("{base}/"));
        let out = provider.send(&request()).await.unwrap();
        assert_eq!(out.content, "下書き");
    }

    #[tokio::test]
    async fn maps_429_and_5xx() {
        let app = Router::new()
            .route(
                "/limited/v1beta/models/{model}",
                post(|| async {
                    let mut h = HeaderMap::new();
                    h.insert("retry-after", "7".parse().unwrap());
                    (StatusCode::TOO_MANY_REQUESTS, h, "slow down")
                }),
            )
            .route(
                "/stalled/v1beta/models/{model}",
                post(|| async {
                    let mut h = HeaderMap::new();
                    h.insert("retry-after", "18446744073709552".parse().unwrap());
                    (StatusCode::TOO_MANY_REQUESTS, h, "come back much later")
                }),
            )
            .route(
                "/broken/v1beta/models/{model}",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
            );
        let base = serve(app).await;

        let limited = GeminiProvider::new("k", format!("{base}/limited"));
        assert!(matches!(
            limited.send(&request()).await,
            Err(ProviderError::RateLimited { retry_after_ms: 7000 })
        ));

        let stalled = GeminiProvider::new("k", format!("{base}/stalled"));
        match stalled.send(&request()).await {
            Err(ProviderError::RateLimited { retry_after_ms }) => {
                assert_eq!(retry_after_ms, MAX_RETRY_AFTER_MS)
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        let broken = GeminiProvider::new("k", format!("{base}/broken"));
        match broken.send(&request()).await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
