//! Minimal LLM client for generating multiple-choice questions.
//!
//! Talks to any OpenAI-compatible chat.completions endpoint (xAI by default) and
//! requests a strict JSON object. Generated items are validated before they can
//! enter the bank.
//!
//! NOTE: We never log the API key and only log truncated payloads.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{DifficultyLabel, Question, QuestionSource, OPTION_LETTERS};
use crate::util::{fill_template, trunc_for_log};

/// Upper bound on questions requested in one call.
pub const MAX_BATCH: usize = 5;

#[derive(Clone)]
pub struct QuestionGenerator {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

/// What to generate.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub exam_type: String,
  pub topic: String,
  pub difficulty: DifficultyLabel,
  pub user_score: f64,
  pub count: usize,
}

#[derive(Deserialize)]
struct GenBatch {
  questions: Vec<GenItem>,
}

#[derive(Deserialize)]
struct GenItem {
  question: String,
  options: GenOptions,
  answer: String,
  #[serde(default)]
  explanation: String,
}

#[derive(Deserialize)]
struct GenOptions {
  #[serde(rename = "A")] a: String,
  #[serde(rename = "B")] b: String,
  #[serde(rename = "C")] c: String,
  #[serde(rename = "D")] d: String,
}

impl QuestionGenerator {
  /// Construct the client if we find XAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("XAI_API_KEY").ok()?;
    let base_url = std::env::var("XAI_BASE_URL").unwrap_or_else(|_| "https://api.x.ai/v1".into());
    let model = std::env::var("XAI_MODEL").unwrap_or_else(|_| "grok-2-1212".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(4000),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "prepforge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(format!("LLM HTTP {}: {}", status, trunc_for_log(&msg, 300)));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(target: "generator", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text)
      .map_err(|e| format!("JSON parse error: {} (payload: {})", e, trunc_for_log(&text, 200)))
  }

  /// Generate up to `MAX_BATCH` validated questions for the request.
  #[instrument(
    level = "info",
    skip(self, prompts, req),
    fields(exam_type = %req.exam_type, difficulty = req.difficulty.as_str(), count = req.count)
  )]
  pub async fn generate(&self, prompts: &Prompts, req: &GenerationRequest) -> Result<Vec<Question>, String> {
    let (system, user) = build_prompts(prompts, req);
    let start = std::time::Instant::now();
    let result = self.chat_json::<GenBatch>(&system, &user, 0.8).await;
    let elapsed = start.elapsed();

    let batch = match result {
      Ok(b) => {
        info!(target: "generator", ?elapsed, "Model response received successfully");
        b
      }
      Err(e) => {
        error!(target: "generator", ?elapsed, error = %e, "Model call failed during question generation");
        return Err(format!("Model generation failed: {e}"));
      }
    };

    let questions = accept_batch(batch, req)?;
    info!(target: "generator", accepted = questions.len(), "Questions generated");
    Ok(questions)
  }
}

fn build_prompts(prompts: &Prompts, req: &GenerationRequest) -> (String, String) {
  let count = req.count.clamp(1, MAX_BATCH).to_string();
  let score = format!("{:.1}", req.user_score);
  let pairs = [
    ("exam_type", req.exam_type.as_str()),
    ("topic", req.topic.as_str()),
    ("difficulty", req.difficulty.as_str()),
    ("count", count.as_str()),
    ("user_score", score.as_str()),
    ("guidance", prompts.guidance(req.difficulty)),
  ];
  (
    fill_template(&prompts.generation_system, &pairs),
    fill_template(&prompts.generation_user_template, &pairs),
  )
}

/// Validate every item; a batch with no usable item is an error.
fn accept_batch(batch: GenBatch, req: &GenerationRequest) -> Result<Vec<Question>, String> {
  let mut out = Vec::new();
  for (i, item) in batch.questions.into_iter().take(MAX_BATCH).enumerate() {
    match validate_item(item, req) {
      Ok(q) => out.push(q),
      Err(e) => error!(target: "generator", index = i, error = %e, "Rejected generated question"),
    }
  }
  if out.is_empty() {
    return Err("model returned no valid questions".into());
  }
  Ok(out)
}

fn validate_item(item: GenItem, req: &GenerationRequest) -> Result<Question, String> {
  let text = item.question.trim().to_string();
  if text.is_empty() {
    return Err("empty question text".into());
  }
  let choices: Vec<String> = [item.options.a, item.options.b, item.options.c, item.options.d]
    .into_iter()
    .map(|c| c.trim().to_string())
    .collect();
  if choices.iter().any(|c| c.is_empty()) {
    return Err("empty option".into());
  }
  let answer = item.answer.trim().to_ascii_uppercase();
  if !OPTION_LETTERS.contains(&answer.as_str()) {
    return Err(format!("invalid answer '{}'", item.answer));
  }

  Ok(Question {
    id: Uuid::new_v4().to_string(),
    exam_type: req.exam_type.clone(),
    subject: req.topic.clone(),
    difficulty: req.difficulty,
    text,
    choices,
    correct_answer: answer,
    explanation: item.explanation.trim().to_string(),
    topics: vec![req.topic.clone()],
    source: QuestionSource::Generated,
    created_at: Utc::now(),
  })
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request() -> GenerationRequest {
    GenerationRequest {
      exam_type: "MCAT".into(),
      topic: "biochemistry".into(),
      difficulty: DifficultyLabel::Hard,
      user_score: 82.0,
      count: 2,
    }
  }

  #[test]
  fn prompts_are_filled() {
    let (system, user) = build_prompts(&Prompts::default(), &request());
    assert!(system.contains("MCAT"));
    assert!(system.contains("82.0%"));
    assert!(system.contains("complex scenarios"));
    assert!(user.contains("Generate 2 original hard-level MCAT"));
    assert!(!user.contains("{topic}"));
  }

  #[test]
  fn batch_keeps_only_valid_items() {
    let raw = r#"{"questions": [
      {"question": "Which enzyme unwinds DNA?", "options": {"A": "Ligase", "B": "Helicase", "C": "Primase", "D": "Polymerase"}, "answer": "b", "explanation": "Helicase separates strands."},
      {"question": "Broken", "options": {"A": "x", "B": "y", "C": "z", "D": "w"}, "answer": "E"},
      {"question": "  ", "options": {"A": "x", "B": "y", "C": "z", "D": "w"}, "answer": "A"}
    ]}"#;
    let batch: GenBatch = serde_json::from_str(raw).unwrap();
    let qs = accept_batch(batch, &request()).unwrap();
    assert_eq!(qs.len(), 1);
    assert_eq!(qs[0].correct_answer, "B");
    assert_eq!(qs[0].choices[1], "Helicase");
    assert_eq!(qs[0].source, QuestionSource::Generated);
    assert_eq!(qs[0].topics, vec!["biochemistry".to_string()]);
  }

  #[test]
  fn batch_without_valid_items_is_an_error() {
    let batch: GenBatch = serde_json::from_str(r#"{"questions": []}"#).unwrap();
    assert!(accept_batch(batch, &request()).is_err());
  }

  #[test]
  fn api_error_message_is_extracted() {
    let body = r#"{"error": {"message": "rate limited", "type": "requests"}}"#;
    assert_eq!(extract_api_error(body), Some("rate limited".into()));
    assert_eq!(extract_api_error("<html>"), None);
  }
}
