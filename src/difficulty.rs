//! Question difficulty: read path (rating) and write path (statistics update).
//!
//! Ratings live in [-2, 2]. With enough answers the rating is `-ln(p)` of the
//! smoothed correct rate `p` (floored at 1%); before that the authored label
//! decides.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{DifficultyLabel, ItemStatistics};
use crate::error::EngineError;
use crate::retry::RetryPolicy;
use crate::store::{QuestionBank, StatsStore};

pub const DIFFICULTY_BOUND: f64 = 2.0;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DifficultyParams {
  /// Observed data is trusted once `times_answered` exceeds this.
  pub min_responses: u64,
  pub accuracy_alpha: f64,
  pub latency_alpha: f64,
  /// Discrimination stays untouched until `times_answered` exceeds this.
  pub discrimination_after: u64,
  pub discrimination_cap: f64,
  pub discrimination_scale: f64,
}

impl Default for DifficultyParams {
  fn default() -> Self {
    Self {
      min_responses: 5,
      accuracy_alpha: 0.1,
      latency_alpha: 0.2,
      discrimination_after: 20,
      discrimination_cap: 2.0,
      discrimination_scale: 50.0,
    }
  }
}

/// `-ln(max(0.01, pct / 100))`, clamped to [-2, 2].
pub fn rating_from_accuracy(correct_percentage: f64) -> f64 {
  let p = (correct_percentage / 100.0).max(0.01);
  (-p.ln()).clamp(-DIFFICULTY_BOUND, DIFFICULTY_BOUND)
}

/// Rating for an item given whatever is known about it.
pub fn current_rating(
  stats: Option<&ItemStatistics>,
  label: Option<DifficultyLabel>,
  params: &DifficultyParams,
) -> f64 {
  match stats {
    Some(s) if s.times_answered > params.min_responses => rating_from_accuracy(s.correct_percentage),
    _ => label.map(DifficultyLabel::prior_rating).unwrap_or(0.0),
  }
}

/// Saturating confidence in the item's discrimination; approaches the cap as data accumulates.
pub fn discrimination_for(times_answered: u64, params: &DifficultyParams) -> Option<f64> {
  if times_answered > params.discrimination_after {
    Some((times_answered as f64 / params.discrimination_scale).min(params.discrimination_cap))
  } else {
    None
  }
}

/// Apply one answer to a copy of `prev`. `prev` itself is left untouched.
pub fn apply_response(
  prev: &ItemStatistics,
  correct: bool,
  latency_secs: Option<f64>,
  params: &DifficultyParams,
  now: DateTime<Utc>,
) -> ItemStatistics {
  let mut next = prev.clone();
  next.times_answered = prev.times_answered.saturating_add(1);

  let observed = if correct { 100.0 } else { 0.0 };
  next.correct_percentage = if next.times_answered == 1 {
    observed
  } else {
    let a = params.accuracy_alpha;
    ((1.0 - a) * prev.correct_percentage + a * observed).clamp(0.0, 100.0)
  };

  if let Some(t) = latency_secs.filter(|t| *t > 0.0) {
    next.average_latency_secs = Some(match prev.average_latency_secs {
      Some(avg) if avg > 0.0 => {
        let a = params.latency_alpha;
        (1.0 - a) * avg + a * t
      }
      _ => t,
    });
  }

  next.difficulty_rating = rating_from_accuracy(next.correct_percentage);
  if let Some(d) = discrimination_for(next.times_answered, params) {
    next.discrimination_index = d;
  }
  next.last_updated = now;
  next
}

pub struct ItemDifficultyEstimator {
  stats: Arc<dyn StatsStore>,
  bank: Arc<dyn QuestionBank>,
  params: DifficultyParams,
  retry: RetryPolicy,
}

impl ItemDifficultyEstimator {
  pub fn new(
    stats: Arc<dyn StatsStore>,
    bank: Arc<dyn QuestionBank>,
    params: DifficultyParams,
    retry: RetryPolicy,
  ) -> Self {
    Self { stats, bank, params, retry }
  }

  pub fn params(&self) -> &DifficultyParams {
    &self.params
  }

  /// Stored statistics; a failed read is logged and treated as "no data yet".
  pub async fn statistics(&self, item_id: &str) -> Option<ItemStatistics> {
    match self.retry.run("stats.get", || self.stats.get(item_id)).await {
      Ok(s) => s,
      Err(e) => {
        warn!(target: "stats", %item_id, error = %e, "Statistics unavailable; falling back to label");
        None
      }
    }
  }

  /// Rating when the caller already holds the item's label and statistics.
  pub fn rating_with(&self, stats: Option<&ItemStatistics>, label: DifficultyLabel) -> f64 {
    current_rating(stats, Some(label), &self.params)
  }

  /// Rating for an item known only by id. Never fails.
  pub async fn rating(&self, item_id: &str) -> f64 {
    let stats = self.statistics(item_id).await;
    if let Some(s) = stats.as_ref().filter(|s| s.times_answered > self.params.min_responses) {
      return rating_from_accuracy(s.correct_percentage);
    }
    let label = match self.retry.run("bank.get", || self.bank.get(item_id)).await {
      Ok(q) => q.map(|q| q.difficulty),
      Err(e) => {
        warn!(target: "stats", %item_id, error = %e, "Question lookup failed; using neutral difficulty");
        None
      }
    };
    current_rating(stats.as_ref(), label, &self.params)
  }

  /// Fold one answer into the item's statistics and commit it in one write.
  /// On failure nothing is stored and the previous record stays visible.
  #[instrument(level = "info", skip(self, now), fields(%item_id, %correct))]
  pub async fn update_after_response(
    &self,
    item_id: &str,
    correct: bool,
    latency_secs: Option<f64>,
    now: DateTime<Utc>,
  ) -> Result<ItemStatistics, EngineError> {
    // A failed read must not be mistaken for a never-answered item.
    let prev = match self.retry.run("stats.get", || self.stats.get(item_id)).await {
      Ok(Some(s)) => s,
      Ok(None) => ItemStatistics::new(item_id, now),
      Err(source) => {
        error!(target: "stats", %item_id, error = %source, "Failed to read question statistics; update discarded");
        return Err(EngineError::Read { item_id: item_id.to_string(), source });
      }
    };
    let next = apply_response(&prev, correct, latency_secs, &self.params, now);

    match self.stats.commit(next.clone()).await {
      Ok(()) => {
        info!(
          target: "stats",
          %item_id,
          times_answered = next.times_answered,
          correct_percentage = %format!("{:.1}", next.correct_percentage),
          difficulty = %format!("{:.2}", next.difficulty_rating),
          "Updated question statistics"
        );
        debug!(target: "stats", ?next, "Committed statistics");
        Ok(next)
      }
      Err(source) => {
        error!(target: "stats", %item_id, error = %source, "Failed to commit question statistics; update discarded");
        Err(EngineError::Persistence { item_id: item_id.to_string(), source })
      }
    }
  }
}
