//! Remote answer providers: given a question and a sample of incident rows,
//! return text or fail.

use crate::errors::{AppError, AppResult};
use crate::models::CellValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const SAMPLE_ROWS: usize = 20;

pub type SampleRow = BTreeMap<String, CellValue>;

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(&self, question: &str, sample: &[SampleRow]) -> AppResult<String>;
}

pub fn build_prompt(question: &str, sample: &[SampleRow]) -> AppResult<String> {
    let sample = serde_json::to_string_pretty(sample)?;
    Ok(format!(
        "You are a cybersecurity analyst.\n\n\
         QUESTION:\n{}\n\n\
         DATA SAMPLE:\n{}\n\n\
         Respond clearly, using the dataset where relevant.\n",
        question, sample
    ))
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let text = self
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<String>();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Gemini `generateContent` over REST.
pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str, endpoint: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create HTTP client: {}", err)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl AnswerProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn answer(&self, question: &str, sample: &[SampleRow]) -> AppResult<String> {
        let prompt = build_prompt(question, sample)?;
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("model endpoint returned HTTP {}", status)));
        }

        let body: GenerateResponse = response.json().await?;
        body.text()
            .ok_or_else(|| AppError::Upstream("model returned no text".to_string()))
    }
}
