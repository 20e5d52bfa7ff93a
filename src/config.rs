//! Loading service configuration (engine tuning, prompts, question bank) from TOML.
//!
//! Every section is optional; missing fields take the defaults below.
//!
//! ```toml
//! [engine.selector]
//! target_success_rate = 0.7
//!
//! [cache]
//! ttl_secs = 120
//!
//! [[questions]]
//! exam_type = "GMAT"
//! difficulty = "hard"
//! text = "..."
//! choices = ["...", "...", "...", "..."]
//! correct_answer = "C"
//! ```

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ability::AbilityParams;
use crate::cache::CacheSettings;
use crate::difficulty::DifficultyParams;
use crate::domain::{DifficultyLabel, Question, QuestionSource, OPTION_LETTERS};
use crate::retry::RetryPolicy;
use crate::selector::SelectorParams;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub cache: CacheSettings,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
  /// Accepted exam types; empty means the built-in list.
  #[serde(default)]
  pub exam_types: Vec<String>,
}

/// Tuning knobs for the adaptive engine.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub ability: AbilityParams,
  #[serde(default)]
  pub difficulty: DifficultyParams,
  #[serde(default)]
  pub selector: SelectorParams,
  #[serde(default)]
  pub retry: RetryPolicy,
}

/// Question entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)] pub id: Option<String>,
  pub exam_type: String,
  #[serde(default)] pub subject: Option<String>,
  pub difficulty: String,
  pub text: String,
  pub choices: Vec<String>,
  pub correct_answer: String,
  #[serde(default)] pub explanation: Option<String>,
  #[serde(default)] pub topics: Vec<String>,
}

impl QuestionCfg {
  /// Validate and convert. Rejects entries that could never be graded.
  pub fn into_question(self) -> Result<Question, String> {
    let difficulty = DifficultyLabel::parse(&self.difficulty)
      .ok_or_else(|| format!("unknown difficulty '{}'", self.difficulty))?;
    if self.text.trim().is_empty() {
      return Err("empty question text".into());
    }
    if self.choices.len() != OPTION_LETTERS.len() {
      return Err(format!("expected {} choices, got {}", OPTION_LETTERS.len(), self.choices.len()));
    }
    let answer = self.correct_answer.trim().to_ascii_uppercase();
    if !OPTION_LETTERS.contains(&answer.as_str()) {
      return Err(format!("correct_answer '{}' is not one of A-D", self.correct_answer));
    }
    Ok(Question {
      id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
      exam_type: self.exam_type,
      subject: self.subject.unwrap_or_default(),
      difficulty,
      text: self.text,
      choices: self.choices,
      correct_answer: answer,
      explanation: self.explanation.unwrap_or_default(),
      topics: self.topics,
      source: QuestionSource::LocalBank,
      created_at: Utc::now(),
    })
  }
}

/// Prompts used by the question generator. `{exam_type}`, `{difficulty}`,
/// `{topic}`, `{count}`, `{user_score}` and `{guidance}` are filled in per call.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  pub generation_user_template: String,
  pub guidance_easy: String,
  pub guidance_medium: String,
  pub guidance_hard: String,
  pub guidance_expert: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are an expert {exam_type} question writer. The learner currently scores {user_score}% on {topic}. Target difficulty: {difficulty}. {guidance}\nEach question has exactly 4 options (A, B, C, D), one correct answer and three plausible distractors. Respond ONLY with strict JSON: {\"questions\": [{\"question\": string, \"options\": {\"A\": string, \"B\": string, \"C\": string, \"D\": string}, \"answer\": \"A\"|\"B\"|\"C\"|\"D\", \"explanation\": string}]}".into(),
      generation_user_template: "Generate {count} original {difficulty}-level {exam_type} multiple-choice question(s) focused on {topic}. Include a detailed explanation for each. Respond with valid JSON only.".into(),
      guidance_easy: "Focus on fundamental concepts with straightforward language; avoid multi-step problems.".into(),
      guidance_medium: "Use moderate complexity with some multi-step reasoning and practical applications.".into(),
      guidance_hard: "Use complex scenarios, advanced applications and nuanced concepts.".into(),
      guidance_expert: "Write the hardest items the real exam would contain, including edge cases.".into(),
    }
  }
}

impl Prompts {
  pub fn guidance(&self, label: DifficultyLabel) -> &str {
    match label {
      DifficultyLabel::Easy => &self.guidance_easy,
      DifficultyLabel::Medium => &self.guidance_medium,
      DifficultyLabel::Hard => &self.guidance_hard,
      DifficultyLabel::Expert => &self.guidance_expert,
    }
  }
}

pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  let mut cfg = toml::from_str::<AppConfig>(s)?;
  cfg.engine.sanitize();
  Ok(cfg)
}

/// Replace `value` with `default` unless `ok` accepts it.
fn keep_or_default(section: &str, field: &str, value: &mut f64, default: f64, ok: impl Fn(f64) -> bool) {
  if !(value.is_finite() && ok(*value)) {
    warn!(target: "prepforge_backend", %section, %field, rejected = *value, default, "Invalid engine setting; using default");
    *value = default;
  }
}

impl EngineConfig {
  /// Reset out-of-range tuning values to their defaults.
  pub fn sanitize(&mut self) {
    let a = AbilityParams::default();
    keep_or_default("engine.ability", "decay_days", &mut self.ability.decay_days, a.decay_days, |v| v > 0.0);
    keep_or_default(
      "engine.ability",
      "expected_latency_secs",
      &mut self.ability.expected_latency_secs,
      a.expected_latency_secs,
      |v| v > 0.0,
    );

    let d = DifficultyParams::default();
    let unit = |v: f64| v > 0.0 && v <= 1.0;
    keep_or_default("engine.difficulty", "accuracy_alpha", &mut self.difficulty.accuracy_alpha, d.accuracy_alpha, unit);
    keep_or_default("engine.difficulty", "latency_alpha", &mut self.difficulty.latency_alpha, d.latency_alpha, unit);
    keep_or_default("engine.difficulty", "discrimination_cap", &mut self.difficulty.discrimination_cap, d.discrimination_cap, |v| v >= 0.0);
    keep_or_default(
      "engine.difficulty",
      "discrimination_scale",
      &mut self.difficulty.discrimination_scale,
      d.discrimination_scale,
      |v| v > 0.0,
    );

    let sel = SelectorParams::default();
    keep_or_default(
      "engine.selector",
      "target_success_rate",
      &mut self.selector.target_success_rate,
      sel.target_success_rate,
      |v| v > 0.0 && v < 1.0,
    );
    keep_or_default("engine.selector", "discrimination", &mut self.selector.discrimination, sel.discrimination, |v| v > 0.0);
    keep_or_default("engine.selector", "jitter", &mut self.selector.jitter, sel.jitter, |v| v >= 0.0);
    keep_or_default(
      "engine.selector",
      "exploration_multiplier",
      &mut self.selector.exploration_multiplier,
      sel.exploration_multiplier,
      |v| v > 0.0,
    );
    keep_or_default("engine.selector", "weak_topic_accuracy", &mut self.selector.weak_topic_accuracy, sel.weak_topic_accuracy, |v| {
      (0.0..=1.0).contains(&v)
    });
    if self.selector.recency_hours < 0 {
      warn!(target: "prepforge_backend", rejected = self.selector.recency_hours, "Negative recency_hours; using default");
      self.selector.recency_hours = sel.recency_hours;
    }
  }
}

/// Attempt to load `AppConfig` from PREPFORGE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("PREPFORGE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "prepforge_backend", %path, questions = cfg.questions.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "prepforge_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "prepforge_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Convert the configured bank, dropping invalid entries with a warning.
pub fn bank_questions(cfg: &AppConfig) -> Vec<Question> {
  cfg
    .questions
    .iter()
    .cloned()
    .enumerate()
    .filter_map(|(i, qc)| {
      let exam = qc.exam_type.clone();
      match qc.into_question() {
        Ok(q) => Some(q),
        Err(e) => {
          warn!(target: "question", index = i, %exam, error = %e, "Skipping bank question");
          None
        }
      }
    })
    .collect()
}
