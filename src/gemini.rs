//! Recognition backend talking to the Gemini `generateContent` endpoint.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::constants::{DEFAULT_MODEL, REQUEST_TIMEOUT_SEC};
use crate::recognition::{BackendError, RecognitionBackend};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
// The key travels in this header, never in the URL
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    /// Build a client. A blank key is rejected up front.
    pub fn new(api_key: &str, model: Option<&str>, timeout_sec: Option<f64>) -> Result<Self, BackendError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(BackendError::NotConfigured);
        }
        let requested = timeout_sec.unwrap_or(REQUEST_TIMEOUT_SEC).max(0.1);
        let timeout = Duration::try_from_secs_f64(requested).unwrap_or_else(|_| {
            log::warn!("Request timeout {requested}s out of range, using {REQUEST_TIMEOUT_SEC}s");
            Duration::from_secs_f64(REQUEST_TIMEOUT_SEC)
        });
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at another server (proxies, test doubles).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl RecognitionBackend for GeminiClient {
    fn describe(&self, prompt: &str, png: &[u8]) -> Result<String, BackendError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": "image/png", "data": BASE64.encode(png) } }
                ]
            }]
        });

        log::debug!("POST {} ({} byte image)", self.endpoint(), png.len());
        let resp = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .map_err(map_transport_error)?;

        let status = resp.status();
        let text = resp.text().map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(classify_status(status, text));
        }

        parse_response(&text)
    }
}

fn map_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.without_url().to_string())
    }
}

pub(crate) fn classify_status(status: StatusCode, body: String) -> BackendError {
    let auth = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || body.contains("API_KEY_INVALID");
    if auth {
        BackendError::Authentication(format!("{status}"))
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        BackendError::Timeout
    } else {
        BackendError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

/// Join the text parts of the first candidate.
pub(crate) fn parse_response(body: &str) -> Result<String, BackendError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    Ok(text.to_string())
}
