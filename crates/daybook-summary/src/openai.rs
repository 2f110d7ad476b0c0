//! Chat-completions client.

use std::time::Duration;

use daybook_core::config::SummaryConfig;
use daybook_core::summary_text::empty_day;
use daybook_core::{Report, RepositoryRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prompt::build_prompt;
use crate::{bound, Summarizer, SummaryError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiSummarizer {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_chars: usize,
    repositories: Vec<RepositoryRef>,
}

impl OpenAiSummarizer {
    pub fn new(cfg: &SummaryConfig, api_key: impl Into<String>, repositories: Vec<RepositoryRef>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(cfg.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            endpoint: format!("{}/chat/completions", cfg.api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            max_chars: cfg.max_chars,
            repositories,
        }
    }

    fn request_body(&self, prompt: &str) -> Result<String, SummaryError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        Ok(serde_json::to_string(&body)?)
    }
}

fn post_blocking(
    agent: &ureq::Agent,
    endpoint: &str,
    api_key: &str,
    body: String,
) -> Result<String, SummaryError> {
    let mut response = agent
        .post(endpoint)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {api_key}"))
        .send(body)?;
    let status = response.status().as_u16();
    let text = response.body_mut().read_to_string()?;
    if !(200..300).contains(&status) {
        return Err(SummaryError::Status { status, body: text });
    }
    Ok(text)
}

/// Content of the first choice, if non-blank.
fn extract_content(raw: &str) -> Result<String, SummaryError> {
    let parsed: ChatResponse = serde_json::from_str(raw)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(SummaryError::Empty)
}

#[async_trait::async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, report: &Report) -> Result<String, SummaryError> {
        if report.is_empty() {
            return Ok(empty_day(&report.date.to_string()));
        }
        let prompt = build_prompt(report, &self.repositories);
        let body = self.request_body(&prompt)?;
        debug!(date = %report.date, model = %self.model, "requesting summary");

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        let raw = tokio::task::spawn_blocking(move || post_blocking(&agent, &endpoint, &api_key, body))
            .await
            .map_err(|e| SummaryError::Join(e.to_string()))??;

        Ok(bound(&extract_content(&raw)?, self.max_chars))
    }
}
