//! Domain models: questions, answer history, and per-question statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse difficulty label authored with the question (or requested from the generator).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLabel {
  Easy,
  Medium,
  Hard,
  Expert,
}
impl Default for DifficultyLabel {
  fn default() -> Self { DifficultyLabel::Medium }
}

impl DifficultyLabel {
  /// Static rating used until a question has enough answers of its own.
  pub fn prior_rating(self) -> f64 {
    match self {
      DifficultyLabel::Easy => -1.0,
      DifficultyLabel::Medium => 0.0,
      DifficultyLabel::Hard => 1.0,
      DifficultyLabel::Expert => 2.0,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DifficultyLabel::Easy => "easy",
      DifficultyLabel::Medium => "medium",
      DifficultyLabel::Hard => "hard",
      DifficultyLabel::Expert => "expert",
    }
  }

  /// Lenient parse used for labels coming from config and query strings.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(DifficultyLabel::Easy),
      "medium" => Some(DifficultyLabel::Medium),
      "hard" => Some(DifficultyLabel::Hard),
      "expert" => Some(DifficultyLabel::Expert),
      _ => None,
    }
  }
}

/// Where did the question come from?
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
  LocalBank,   // from the TOML bank
  Generated,   // generated via the LLM and kept in memory
  Seed,        // built-in seeds (last resort)
}

/// Multiple-choice question. `choices[0]` is option A, `choices[3]` is option D.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub exam_type: String,
  #[serde(default)] pub subject: String,
  #[serde(default)] pub difficulty: DifficultyLabel,
  pub text: String,
  pub choices: Vec<String>,
  pub correct_answer: String,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub topics: Vec<String>,
  pub source: QuestionSource,
  pub created_at: DateTime<Utc>,
}

/// Option letters, in choice order.
pub const OPTION_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

/// One user's answer to one question. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
  pub user_id: String,
  pub item_id: String,
  pub category: String,
  pub correct: bool,
  /// Seconds spent answering, when the client reported it.
  #[serde(default)] pub latency_secs: Option<f64>,
  pub answered_at: DateTime<Utc>,
}

/// Aggregated, mutable summary per question.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemStatistics {
  pub item_id: String,
  pub times_answered: u64,
  /// Exponentially weighted, always within [0, 100].
  pub correct_percentage: f64,
  /// Exponentially weighted seconds; `None` until a timed answer arrives.
  pub average_latency_secs: Option<f64>,
  pub difficulty_rating: f64,
  pub discrimination_index: f64,
  pub last_updated: DateTime<Utc>,
}

impl ItemStatistics {
  pub fn new(item_id: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      item_id: item_id.into(),
      times_answered: 0,
      correct_percentage: 0.0,
      average_latency_secs: None,
      difficulty_rating: 0.0,
      discrimination_index: 0.0,
      last_updated: now,
    }
  }
}
