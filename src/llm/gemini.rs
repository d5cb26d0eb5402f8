use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::media::{detect_mime_type, download_media};
use crate::pipeline::GenerativeModel;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

/// Client for the `generateContent` endpoint of the Generative Language
/// API. Images are attached inline as base64 parts.
pub struct GeminiClient;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

fn redact_gemini_api_key(text: &str) -> String {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn build_safety_settings() -> Vec<Value> {
    let threshold = match CONFIG.gemini_safety_settings.as_str() {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        _ => "OFF",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

async fn image_part(image_url: &str) -> Result<Value> {
    let bytes = download_media(image_url)
        .await
        .ok_or_else(|| anyhow!("failed to download image from {image_url}"))?;
    let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/jpeg".to_string());
    let encoded = general_purpose::STANDARD.encode(bytes);
    Ok(json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": encoded
        }
    }))
}

async fn call_gemini_api(model: &str, payload: Value) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
    );

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .header("x-goog-api-key", &CONFIG.gemini_api_key)
            .timeout(Duration::from_secs(CONFIG.gemini_request_timeout_seconds))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_gemini_api_key(&err.to_string());
                let should_retry = should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini request failed to send: {err_text} (timeout={}, connect={}, retrying={should_retry})",
                    err.is_timeout(),
                    err.is_connect()
                );
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!("Gemini request failed: {err_text}"));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry = should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
            warn!("Gemini API error: status={status}, body={body_summary}, retrying={should_retry}");
            if should_retry {
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!("Gemini request failed with status {status}: {detail}"));
        }

        return Ok(response.json::<GeminiResponse>().await?);
    }
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text {
                if !text.trim().is_empty() {
                    text_parts.push(text);
                }
            }
        }
    }
    text_parts.join("\n")
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        image_url: Option<&str>,
        user_text: &str,
    ) -> Result<String> {
        let mut parts = Vec::new();
        if let Some(url) = image_url {
            parts.push(image_part(url).await?);
        }
        parts.push(json!({ "text": user_text }));

        let payload = json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": CONFIG.gemini_temperature,
                "topK": CONFIG.gemini_top_k,
                "topP": CONFIG.gemini_top_p,
                "maxOutputTokens": CONFIG.gemini_max_output_tokens,
            },
            "safetySettings": build_safety_settings(),
        });

        let model = CONFIG.gemini_model.as_str();
        let operation = if image_url.is_some() {
            "complete_with_image"
        } else {
            "complete_text_only"
        };

        log_llm_timing("gemini", model, operation, || async {
            let response = call_gemini_api(model, payload).await?;
            let text = extract_text_from_response(response);
            if text.trim().is_empty() {
                return Err(anyhow!("Gemini returned no text"));
            }
            debug!(target: "llm.gemini", model, reply = %truncate_for_log(&text, 200));
            Ok(text)
        })
        .await
    }
}
