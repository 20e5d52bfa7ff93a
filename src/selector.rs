//! Adaptive question selection.
//!
//! Each candidate gets a predicted success probability from the two-parameter
//! logistic model, `P = 1 / (1 + exp(-D (ability - difficulty)))`. The question
//! whose `P` lands closest to the target rate wins. Small random jitter breaks
//! ties, and items with few answers get a slight bonus so new content rotates in.
//!
//! Selection never fails on estimator errors; those degrade to defaults. The only
//! non-question outcomes are `Unavailable::PoolExhausted` and
//! `Unavailable::CatalogUnavailable`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::ability::AbilityEstimator;
use crate::config::EngineConfig;
use crate::difficulty::ItemDifficultyEstimator;
use crate::domain::{ItemStatistics, Question};
use crate::error::{EngineError, Unavailable};
use crate::retry::RetryPolicy;
use crate::store::{QuestionBank, ResponseLog, StatsStore};

/// Bound on the logistic exponent.
const MAX_EXPONENT: f64 = 10.0;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SelectorParams {
  pub target_success_rate: f64,
  pub discrimination: f64,
  pub recency_hours: i64,
  /// Upper bound of the uniform jitter added to each score.
  pub jitter: f64,
  pub exploration_threshold: u64,
  pub exploration_multiplier: f64,

  pub readiness_days: i64,
  pub readiness_min_answers: usize,
  pub recommendation_days: i64,
  pub recommendation_min_answers: usize,
  pub weak_topic_accuracy: f64,
  pub max_recommendations: usize,
}

impl Default for SelectorParams {
  fn default() -> Self {
    Self {
      target_success_rate: 0.75,
      discrimination: 1.0,
      recency_hours: 24,
      jitter: 0.1,
      exploration_threshold: 10,
      exploration_multiplier: 0.9,
      readiness_days: 7,
      readiness_min_answers: 10,
      recommendation_days: 14,
      recommendation_min_answers: 3,
      weak_topic_accuracy: 0.7,
      max_recommendations: 5,
    }
  }
}

/// Probability of a correct answer, always strictly inside (0, 1).
pub fn response_probability(ability: f64, difficulty: f64, discrimination: f64) -> f64 {
  let exponent = discrimination * (ability - difficulty);
  let exponent = if exponent.is_nan() { 0.0 } else { exponent.clamp(-MAX_EXPONENT, MAX_EXPONENT) };
  1.0 / (1.0 + (-exponent).exp())
}

/// A candidate with everything needed to score it.
#[derive(Clone, Debug)]
pub struct Candidate {
  pub question: Question,
  pub stats: Option<ItemStatistics>,
  pub difficulty: f64,
}

impl Candidate {
  fn times_answered(&self) -> u64 {
    self.stats.as_ref().map(|s| s.times_answered).unwrap_or(0)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scored {
  pub index: usize,
  pub probability: f64,
  pub score: f64,
}

/// Lowest score wins. Returns `None` for an empty slice.
pub fn pick_best<R: Rng + ?Sized>(
  candidates: &[Candidate],
  ability: f64,
  target: f64,
  params: &SelectorParams,
  rng: &mut R,
) -> Option<Scored> {
  let mut best: Option<Scored> = None;
  for (index, c) in candidates.iter().enumerate() {
    let probability = response_probability(ability, c.difficulty, params.discrimination);
    let mut score = (probability - target).abs();
    if params.jitter > 0.0 {
      score += rng.gen_range(0.0..params.jitter);
    }
    if c.times_answered() < params.exploration_threshold {
      score *= params.exploration_multiplier;
    }
    if best.as_ref().map_or(true, |b| score < b.score) {
      best = Some(Scored { index, probability, score });
    }
  }
  best
}

/// The chosen question and how it was scored.
#[derive(Clone, Debug)]
pub struct Selection {
  pub question: Question,
  pub ability: f64,
  pub difficulty: f64,
  pub probability: f64,
  pub score: f64,
  pub pool_size: usize,
  /// True when every question had been answered recently and the filter was dropped.
  pub relaxed_recency: bool,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
  pub readiness_score: u32,
  pub confidence: Confidence,
  pub recommendation: String,
  pub accuracy: Option<f64>,
  pub avg_response_time: Option<f64>,
  pub answers_considered: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicRecommendation {
  pub topic: String,
  pub accuracy: f64,
  pub questions_answered: usize,
}

pub struct AdaptiveSelector {
  bank: Arc<dyn QuestionBank>,
  history: Arc<dyn ResponseLog>,
  ability: AbilityEstimator,
  items: ItemDifficultyEstimator,
  params: SelectorParams,
  retry: RetryPolicy,
}

impl AdaptiveSelector {
  pub fn new(
    bank: Arc<dyn QuestionBank>,
    history: Arc<dyn ResponseLog>,
    stats: Arc<dyn StatsStore>,
    cfg: &EngineConfig,
  ) -> Self {
    let ability = AbilityEstimator::new(history.clone(), cfg.ability.clone(), cfg.retry.clone());
    let items = ItemDifficultyEstimator::new(stats, bank.clone(), cfg.difficulty.clone(), cfg.retry.clone());
    Self { bank, history, ability, items, params: cfg.selector.clone(), retry: cfg.retry.clone() }
  }

  pub fn params(&self) -> &SelectorParams {
    &self.params
  }

  pub fn abilities(&self) -> &AbilityEstimator {
    &self.ability
  }

  pub fn items(&self) -> &ItemDifficultyEstimator {
    &self.items
  }

  pub async fn ability(&self, user_id: &str, category: &str) -> f64 {
    self.ability.ability(user_id, category, &self.items, Utc::now()).await
  }

  pub async fn select_next(
    &self,
    user_id: &str,
    category: &str,
    target: Option<f64>,
  ) -> Result<Selection, Unavailable> {
    self.select_next_at(user_id, category, target, Utc::now()).await
  }

  #[instrument(level = "info", skip(self, now))]
  pub async fn select_next_at(
    &self,
    user_id: &str,
    category: &str,
    target: Option<f64>,
    now: DateTime<Utc>,
  ) -> Result<Selection, Unavailable> {
    let target = target.unwrap_or(self.params.target_success_rate);
    let ability = self.ability.ability(user_id, category, &self.items, now).await;

    let pool = self
      .retry
      .run("bank.questions_for", || self.bank.questions_for(category))
      .await
      .map_err(|e| {
        warn!(target: "selector", %category, error = %e, "Question bank unavailable");
        Unavailable::CatalogUnavailable(e.to_string())
      })?;
    if pool.is_empty() {
      info!(target: "selector", %user_id, %category, "Pool exhausted");
      return Err(Unavailable::PoolExhausted);
    }

    let since = now - Duration::hours(self.params.recency_hours);
    let recent = match self
      .retry
      .run("response_log.answered_since", || self.history.answered_since(user_id, category, since))
      .await
    {
      Ok(ids) => ids,
      Err(e) => {
        warn!(target: "selector", %user_id, %category, error = %e, "Recent answers unavailable; not filtering");
        HashSet::new()
      }
    };

    let pool_total = pool.len();
    let fresh: Vec<Question> = pool.iter().filter(|q| !recent.contains(&q.id)).cloned().collect();
    let (pool, relaxed_recency) = if fresh.is_empty() { (pool, true) } else { (fresh, false) };
    if relaxed_recency {
      info!(target: "selector", %user_id, %category, pool_total, "All questions answered recently; relaxing recency filter");
    }

    let mut candidates = Vec::with_capacity(pool.len());
    for question in pool {
      let stats = self.items.statistics(&question.id).await;
      let difficulty = self.items.rating_with(stats.as_ref(), question.difficulty);
      candidates.push(Candidate { question, stats, difficulty });
    }

    let scored = {
      let mut rng = rand::thread_rng();
      pick_best(&candidates, ability, target, &self.params, &mut rng)
    };
    let Some(best) = scored else {
      return Err(Unavailable::PoolExhausted);
    };

    let pool_size = candidates.len();
    let chosen = candidates.swap_remove(best.index);
    info!(
      target: "selector",
      %user_id,
      %category,
      question_id = %chosen.question.id,
      ability = %format!("{:.2}", ability),
      difficulty = %format!("{:.2}", chosen.difficulty),
      probability = %format!("{:.2}", best.probability),
      pool_size,
      relaxed_recency,
      "Selected question"
    );
    Ok(Selection {
      question: chosen.question,
      ability,
      difficulty: chosen.difficulty,
      probability: best.probability,
      score: best.score,
      pool_size,
      relaxed_recency,
    })
  }

  /// Update the item's statistics for one answer. Failures are logged and returned, never panicked.
  pub async fn record_response(
    &self,
    item_id: &str,
    correct: bool,
    latency_secs: Option<f64>,
  ) -> Result<ItemStatistics, EngineError> {
    self.items.update_after_response(item_id, correct, latency_secs, Utc::now()).await
  }

  /// Readiness for the real exam, based on ability and the last week of practice.
  #[instrument(level = "info", skip(self, now))]
  pub async fn exam_readiness_at(&self, user_id: &str, category: &str, now: DateTime<Utc>) -> ReadinessReport {
    let ability = self.ability.ability(user_id, category, &self.items, now).await;
    let since = now - Duration::days(self.params.readiness_days);
    let records = self
      .ability
      .history(user_id, category, since, usize::MAX)
      .await
      .unwrap_or_default();

    if records.len() < self.params.readiness_min_answers {
      return ReadinessReport {
        readiness_score: 0,
        confidence: Confidence::Low,
        recommendation: "Practice more questions to get a reliable assessment".into(),
        accuracy: None,
        avg_response_time: None,
        answers_considered: records.len(),
      };
    }

    let n = records.len() as f64;
    let accuracy = records.iter().filter(|r| r.correct).count() as f64 / n;
    let avg_response_time = records.iter().filter_map(|r| r.latency_secs).sum::<f64>() / n;
    let readiness = ((ability + 3.0) * 100.0 / 6.0).clamp(0.0, 100.0);

    let (confidence, recommendation) = if readiness >= 80.0 {
      (Confidence::High, "You appear ready for the exam! Focus on review and time management.")
    } else if readiness >= 60.0 {
      (Confidence::Medium, "Good progress! Focus on weak topics and practice timing.")
    } else {
      (Confidence::Low, "More practice needed. Focus on fundamentals and building consistency.")
    };

    ReadinessReport {
      readiness_score: readiness as u32,
      confidence,
      recommendation: recommendation.into(),
      accuracy: Some(accuracy),
      avg_response_time: Some(avg_response_time),
      answers_considered: records.len(),
    }
  }

  pub async fn exam_readiness(&self, user_id: &str, category: &str) -> ReadinessReport {
    self.exam_readiness_at(user_id, category, Utc::now()).await
  }

  /// Weakest topics over the recent window, weakest first.
  #[instrument(level = "info", skip(self, now))]
  pub async fn topic_recommendations_at(
    &self,
    user_id: &str,
    category: &str,
    now: DateTime<Utc>,
  ) -> Vec<TopicRecommendation> {
    let since = now - Duration::days(self.params.recommendation_days);
    let Some(records) = self.ability.history(user_id, category, since, usize::MAX).await else {
      return Vec::new();
    };
    if records.is_empty() {
      return Vec::new();
    }

    let topics_by_item: HashMap<String, Vec<String>> =
      match self.retry.run("bank.questions_for", || self.bank.questions_for(category)).await {
        Ok(pool) => pool.into_iter().map(|q| (q.id, q.topics)).collect(),
        Err(e) => {
          warn!(target: "selector", %category, error = %e, "Question bank unavailable; no recommendations");
          return Vec::new();
        }
      };

    // topic -> (correct, total)
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for r in &records {
      let Some(topics) = topics_by_item.get(&r.item_id) else { continue };
      for t in topics {
        let e = tally.entry(t.as_str()).or_insert((0, 0));
        e.1 += 1;
        if r.correct {
          e.0 += 1;
        }
      }
    }

    let mut weak: Vec<TopicRecommendation> = tally
      .into_iter()
      .filter(|(_, (_, total))| *total >= self.params.recommendation_min_answers)
      .map(|(topic, (correct, total))| TopicRecommendation {
        topic: topic.to_string(),
        accuracy: correct as f64 / total as f64,
        questions_answered: total,
      })
      .filter(|t| t.accuracy < self.params.weak_topic_accuracy)
      .collect();
    weak.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
    weak.truncate(self.params.max_recommendations);
    weak
  }

  pub async fn topic_recommendations(&self, user_id: &str, category: &str) -> Vec<TopicRecommendation> {
    self.topic_recommendations_at(user_id, category, Utc::now()).await
  }
}
