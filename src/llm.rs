#![cfg(feature = "web")]
//! Client for the hosted language model and the prompts sent to it.

use crate::config::GeminiConfig;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters of the uploaded text sent for summarization.
pub const SUMMARY_INPUT_CHARS: usize = 8000;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing API key")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid response format")]
    InvalidResponse,
}

/// Text-in, text-out access to a language model.
///
/// Each message becomes one content block of the request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, messages: &[String]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model.trim(),
            api_key
        )
    }
}

fn first_candidate_text(body: &str) -> Result<String, LlmError> {
    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|_| LlmError::InvalidResponse)?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or(LlmError::InvalidResponse)
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, messages: &[String]) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let body = GeminiRequest {
            contents: messages
                .iter()
                .map(|text| GeminiContent {
                    parts: vec![GeminiPart { text: text.clone() }],
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint(api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        first_candidate_text(&text)
    }
}

/// Summarizes uploaded text in French.
///
/// Never fails: a model error becomes a sentence shown in place of the summary.
pub async fn summarize(llm: &dyn LlmClient, text: &str) -> String {
    let excerpt: String = text.chars().take(SUMMARY_INPUT_CHARS).collect();
    let prompt = format!(
        "Résume ce contenu en français, en 5–8 phrases simples et actionnables :\n\n{}",
        excerpt
    );

    match llm.generate(&[prompt]).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("summary failed: {}", e);
            format!("Résumé indisponible ({}).", e)
        }
    }
}

/// Answers a question against the uploaded text.
pub async fn answer(llm: &dyn LlmClient, text: &str, question: &str) -> String {
    let prompt = format!("{}\nRéponds à cette question : {}", text, question);

    match llm.generate(&[prompt]).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!("question failed: {}", e);
            format!("Impossible d'obtenir une réponse ({}).", e)
        }
    }
}

/// Asks the model to fix spelling and grammar of one paragraph.
pub async fn correct_paragraph(llm: &dyn LlmClient, paragraph: &str) -> Result<String, LlmError> {
    let prompt = format!("Corrige ce texte sans changer la structure :\n{}", paragraph);
    llm.generate(&[prompt]).await
}
