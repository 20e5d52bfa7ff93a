//! Learner ability estimation from recent answer history.
//!
//! Ability lives on a bounded logit-like scale, [-3, 3]. Each answer is weighted
//! by `exp(-days_ago / decay_days)`, scaled by how fast it was given relative to
//! an expected latency, and scaled again by `1 + item difficulty`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::difficulty::ItemDifficultyEstimator;
use crate::domain::{DifficultyLabel, ResponseRecord};
use crate::retry::RetryPolicy;
use crate::store::ResponseLog;

pub const ABILITY_BOUND: f64 = 3.0;
pub const NEUTRAL_ABILITY: f64 = 0.0;
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AbilityParams {
  pub window: usize,
  pub lookback_days: i64,
  pub decay_days: f64,
  pub expected_latency_secs: f64,
  /// Answers considered by the percentage score.
  pub score_window: usize,
}

impl Default for AbilityParams {
  fn default() -> Self {
    Self {
      window: 50,
      lookback_days: 30,
      decay_days: 10.0,
      expected_latency_secs: 120.0,
      score_window: 10,
    }
  }
}

/// Multiplier in [0.5, 1.5]; faster than expected pushes it up.
pub fn latency_factor(latency_secs: Option<f64>, expected_secs: f64) -> f64 {
  match latency_secs {
    Some(t) if t > 0.0 => (expected_secs / t).clamp(0.5, 1.5),
    _ => 1.0,
  }
}

/// Weighted ability for a set of records. `difficulty_of` maps an item id to its rating.
pub fn estimate_ability<F>(
  records: &[ResponseRecord],
  difficulty_of: F,
  params: &AbilityParams,
  now: DateTime<Utc>,
) -> f64
where
  F: Fn(&str) -> f64,
{
  let mut weighted_sum = 0.0;
  let mut weight_sum = 0.0;

  for r in records {
    let days_ago = (now - r.answered_at).num_days().max(0) as f64;
    let weight = (-days_ago / params.decay_days).exp();

    let base = if r.correct { 1.0 } else { 0.0 };
    let performance = base * latency_factor(r.latency_secs, params.expected_latency_secs);

    weighted_sum += weight * performance * (1.0 + difficulty_of(&r.item_id));
    weight_sum += weight;
  }

  if weight_sum <= 0.0 {
    return NEUTRAL_ABILITY;
  }
  let accuracy = weighted_sum / weight_sum;
  ((accuracy - 0.5) * 6.0).clamp(-ABILITY_BOUND, ABILITY_BOUND)
}

/// Percentage of correct answers, or the neutral 50 for no history.
pub fn score_percentage(records: &[ResponseRecord]) -> f64 {
  if records.is_empty() {
    return NEUTRAL_SCORE;
  }
  let correct = records.iter().filter(|r| r.correct).count();
  correct as f64 / records.len() as f64 * 100.0
}

/// Coarse label a score-only consumer (e.g. the generator) should target.
pub fn label_for_score(score: f64) -> DifficultyLabel {
  if score < 40.0 {
    DifficultyLabel::Easy
  } else if score <= 70.0 {
    DifficultyLabel::Medium
  } else {
    DifficultyLabel::Hard
  }
}

/// Recommended mix of labels for the next few questions.
pub fn progression_for_ability(ability: f64) -> [DifficultyLabel; 3] {
  use DifficultyLabel::*;
  if ability < -1.5 {
    [Easy, Easy, Medium]
  } else if ability < -0.5 {
    [Easy, Medium, Medium]
  } else if ability < 0.5 {
    [Medium, Medium, Hard]
  } else if ability < 1.5 {
    [Medium, Hard, Hard]
  } else {
    [Hard, Hard, Expert]
  }
}

pub struct AbilityEstimator {
  history: Arc<dyn ResponseLog>,
  params: AbilityParams,
  retry: RetryPolicy,
}

impl AbilityEstimator {
  pub fn new(history: Arc<dyn ResponseLog>, params: AbilityParams, retry: RetryPolicy) -> Self {
    Self { history, params, retry }
  }

  pub fn params(&self) -> &AbilityParams {
    &self.params
  }

  /// History read that never fails: errors are logged and yield `None`.
  pub async fn history(
    &self,
    user_id: &str,
    category: &str,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Option<Vec<ResponseRecord>> {
    match self
      .retry
      .run("response_log.recent", || self.history.recent(user_id, category, since, limit))
      .await
    {
      Ok(records) => Some(records),
      Err(e) => {
        error!(target: "selector", %user_id, %category, error = %e, "History unavailable; using neutral defaults");
        None
      }
    }
  }

  /// Ability in [-3, 3]. No history or a failed read gives 0.0.
  #[instrument(level = "debug", skip(self, items, now))]
  pub async fn ability(
    &self,
    user_id: &str,
    category: &str,
    items: &ItemDifficultyEstimator,
    now: DateTime<Utc>,
  ) -> f64 {
    let since = now - Duration::days(self.params.lookback_days);
    let records = match self.history(user_id, category, since, self.params.window).await {
      Some(r) if !r.is_empty() => r,
      _ => return NEUTRAL_ABILITY,
    };

    let mut ratings = HashMap::<String, f64>::new();
    for r in &records {
      if !ratings.contains_key(&r.item_id) {
        let rating = items.rating(&r.item_id).await;
        ratings.insert(r.item_id.clone(), rating);
      }
    }

    let ability = estimate_ability(
      &records,
      |id| ratings.get(id).copied().unwrap_or(0.0),
      &self.params,
      now,
    );
    debug!(target: "selector", %user_id, %category, records = records.len(), ability = %format!("{:.2}", ability), "Ability estimated");
    ability
  }

  /// Percentage correct over the last few answers; 50.0 when unknown.
  #[instrument(level = "debug", skip(self))]
  pub async fn score(&self, user_id: &str, category: &str) -> f64 {
    match self
      .history(user_id, category, DateTime::<Utc>::MIN_UTC, self.params.score_window)
      .await
    {
      Some(records) => score_percentage(&records),
      None => NEUTRAL_SCORE,
    }
  }
}
