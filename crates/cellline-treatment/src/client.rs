//! Treatment summaries from the Gemini text-generation API.

use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{Result, TreatmentError};

pub const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1/models/gemini-2.0-flash:generateContent";

/// Returned instead of calling the service when no key is configured.
pub const MISSING_KEY_MESSAGE: &str =
    "API key not configured. Please set the Gemini API key in config.properties.";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can describe treatment approaches for a cancer type.
pub trait TreatmentSource {
    /// A short paragraph for `label`, or `None` when the label is empty or
    /// `unknown`; no lookup happens in that case.
    ///
    /// # Errors
    ///
    /// Transport failures, non-200 replies and unparseable replies.
    fn describe(&self, label: &str) -> Result<Option<String>>;
}

/// `true` for labels that never warrant a lookup.
#[must_use]
pub fn is_unknown_label(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.eq_ignore_ascii_case("unknown")
}

#[must_use]
pub fn treatment_prompt(label: &str) -> String {
    format!(
        "Provide a concise paragraph (maximum 100 words) about the current treatment \
         approaches for {label} cancer. Do not include any markdown formatting or code \
         blocks in your response."
    )
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
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

/// Text of the first part of the first candidate.
fn extract_text(body: &str) -> Result<String> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| TreatmentError::Parse(e.to_string()))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| TreatmentError::Parse("response has no candidate text".into()))
}

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    fence: Regex,
}

impl GeminiClient {
    /// # Errors
    ///
    /// `TreatmentError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: config.gemini_api_key.clone(),
            fence: Regex::new(r"```\w*")?,
        })
    }

    /// Points the client at another `generateContent`-compatible URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Removes Markdown code fences and surrounding whitespace.
    #[must_use]
    pub fn clean_response_text(&self, text: &str) -> String {
        self.fence.replace_all(text, "").trim().to_string()
    }
}

impl TreatmentSource for GeminiClient {
    fn describe(&self, label: &str) -> Result<Option<String>> {
        if is_unknown_label(label) {
            debug!("no treatment lookup for unknown label");
            return Ok(None);
        }
        let label = label.trim();
        let Some(key) = self.api_key.as_deref() else {
            warn!("gemini api key not configured");
            return Ok(Some(MISSING_KEY_MESSAGE.to_string()));
        };

        let prompt = treatment_prompt(label);
        let request = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: &prompt }],
            }],
        };

        info!(label, "requesting treatment summary");
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", key)])
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "treatment service error");
            return Err(TreatmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = extract_text(&body)?;
        let cleaned = self.clean_response_text(&text);
        debug!(chars = cleaned.len(), "treatment summary received");
        Ok(Some(cleaned))
    }
}
