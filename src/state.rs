//! Application state: stores, the adaptive selector, the optional generator, and
//! the question-serving fallback chain.
//!
//! This module owns:
//!   - the question bank (seeds + TOML bank + generated, behind the TTL pool cache)
//!   - the answer log and per-question statistics
//!   - the adaptive selector wired to those stores
//!   - the optional LLM generator and its prompts
//!
//! Serving policy: adaptive selection first. If the exam has no questions, ask
//! the generator for a small batch; if that is unavailable, insert a hard
//! fallback question.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::ability::label_for_score;
use crate::cache::CachedQuestionBank;
use crate::config::{bank_questions, load_config_from_env, AppConfig, Prompts};
use crate::domain::QuestionSource;
use crate::error::Unavailable;
use crate::generator::{GenerationRequest, QuestionGenerator};
use crate::seeds::{hard_fallback_question, seed_questions};
use crate::selector::{AdaptiveSelector, Selection};
use crate::store::{
  InMemoryQuestionBank, InMemoryResponseLog, InMemoryStatsStore, QuestionBank, ResponseLog,
  StatsStore,
};

/// Batch size requested when refilling an empty exam.
const REFILL_BATCH: usize = 3;

/// Exam types accepted when no list is configured.
pub const DEFAULT_EXAM_TYPES: [&str; 13] = [
  "GMAT", "GRE", "MCAT", "USMLE_STEP_1", "USMLE_STEP_2", "NCLEX", "LSAT", "IELTS", "TOEFL",
  "PMP", "CFA", "ACT", "SAT",
];

pub struct AppState {
  pub bank: Arc<dyn QuestionBank>,
  pub history: Arc<dyn ResponseLog>,
  pub stats: Arc<dyn StatsStore>,
  pub selector: AdaptiveSelector,
  pub generator: Option<QuestionGenerator>,
  pub prompts: Prompts,
  pub exam_types: Vec<String>,
}

/// Where a served question came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
  Adaptive,
  Generated,
  HardFallback,
}

impl Origin {
  pub fn as_str(self) -> &'static str {
    match self {
      Origin::Adaptive => "adaptive",
      Origin::Generated => "generated",
      Origin::HardFallback => "hard_fallback",
    }
  }
}

impl AppState {
  /// Build state from env: load config, seed the bank, wire the selector, init the generator.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_config_from_env().unwrap_or_default();

    let generator = QuestionGenerator::from_env();
    if let Some(g) = &generator {
      info!(target: "prepforge_backend", base_url = %g.base_url, model = %g.model, "Question generation enabled.");
    } else {
      info!(target: "prepforge_backend", "Question generation disabled (no XAI_API_KEY). Using bank/seed questions.");
    }

    Self::from_config(cfg, generator)
  }

  pub fn from_config(cfg: AppConfig, generator: Option<QuestionGenerator>) -> Self {
    // Config-bank questions take precedence over seeds with the same id.
    let mut questions = bank_questions(&cfg);
    questions.extend(seed_questions());

    // Inventory summary by exam/source.
    let mut counts = std::collections::BTreeMap::<&str, (usize, usize)>::new();
    for q in &questions {
      let e = counts.entry(q.exam_type.as_str()).or_insert((0, 0));
      match q.source {
        QuestionSource::LocalBank => e.0 += 1,
        _ => e.1 += 1,
      }
    }
    for (exam, (bank, seed)) in &counts {
      info!(target: "question", %exam, local_bank = bank, seed = seed, "Startup question inventory");
    }

    let bank: Arc<dyn QuestionBank> = Arc::new(CachedQuestionBank::new(
      InMemoryQuestionBank::with_questions(questions),
      &cfg.cache,
    ));
    let history: Arc<dyn ResponseLog> = Arc::new(InMemoryResponseLog::new());
    let stats: Arc<dyn StatsStore> = Arc::new(InMemoryStatsStore::new());
    let selector = AdaptiveSelector::new(bank.clone(), history.clone(), stats.clone(), &cfg.engine);

    let exam_types = if cfg.exam_types.is_empty() {
      DEFAULT_EXAM_TYPES.iter().map(|s| s.to_string()).collect()
    } else {
      cfg.exam_types.clone()
    };

    Self {
      bank,
      history,
      stats,
      selector,
      generator,
      prompts: cfg.prompts,
      exam_types,
    }
  }

  pub fn is_known_exam(&self, exam_type: &str) -> bool {
    self.exam_types.iter().any(|e| e == exam_type)
  }

  /// Adaptive selection with refill on an empty exam.
  #[instrument(level = "info", skip(self))]
  pub async fn next_question(
    &self,
    user_id: &str,
    exam_type: &str,
    target: Option<f64>,
  ) -> Result<(Selection, Origin), Unavailable> {
    match self.selector.select_next(user_id, exam_type, target).await {
      Ok(s) => return Ok((s, Origin::Adaptive)),
      Err(Unavailable::PoolExhausted) => {}
      Err(e) => return Err(e),
    }

    // 1) Generate a small batch aimed at the learner's level.
    if let Some(generator) = &self.generator {
      let user_score = self.selector.abilities().score(user_id, exam_type).await;
      let req = GenerationRequest {
        exam_type: exam_type.to_string(),
        topic: "General".into(),
        difficulty: label_for_score(user_score),
        user_score,
        count: REFILL_BATCH,
      };
      match generator.generate(&self.prompts, &req).await {
        Ok(questions) => {
          let mut inserted = 0usize;
          for q in questions {
            match self.bank.insert(q).await {
              Ok(()) => inserted += 1,
              Err(e) => error!(target: "question", %exam_type, error = %e, "Failed to store generated question"),
            }
          }
          info!(target: "question", %exam_type, inserted, difficulty = req.difficulty.as_str(), "Refilled exhausted pool");
          if inserted > 0 {
            if let Ok(s) = self.selector.select_next(user_id, exam_type, target).await {
              return Ok((s, Origin::Generated));
            }
          }
        }
        Err(e) => {
          error!(target: "question", %exam_type, error = %e, "Generation failed; using hard fallback");
        }
      }
    } else {
      warn!(target: "question", %exam_type, "XAI_API_KEY not set; using hard fallback");
    }

    // 2) Absolute last resort: hard fallback.
    let q = hard_fallback_question(exam_type);
    let id = q.id.clone();
    self.bank.insert(q).await.map_err(|e| {
      error!(target: "question", %exam_type, error = %e, "Failed to store hard fallback");
      Unavailable::PoolExhausted
    })?;
    warn!(target: "question", %exam_type, chosen = %id, "Inserted hard fallback question");
    let s = self.selector.select_next(user_id, exam_type, target).await?;
    Ok((s, Origin::HardFallback))
  }
}
