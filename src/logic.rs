//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Serving the next question (adaptive selection plus refill)
//!   - Grading a submitted answer, logging it, and updating item statistics
//!   - Ability, readiness, and topic summaries for a learner

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::domain::{Question, ResponseRecord, OPTION_LETTERS};
use crate::error::Unavailable;
use crate::protocol::{ability_out, to_next_out, AbilityOut, AnswerOut, NextQuestionOut};
use crate::state::AppState;
use crate::util::normalize_choice;

/// Why a request could not be served.
#[derive(Debug, PartialEq)]
pub enum ServeError {
  UnknownExam(String),
  UnknownQuestion(String),
  Unavailable(Unavailable),
}

impl std::fmt::Display for ServeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ServeError::UnknownExam(e) => write!(f, "Unknown examType: {}", e),
      ServeError::UnknownQuestion(id) => write!(f, "Unknown questionId: {}", id),
      ServeError::Unavailable(u) => write!(f, "{}", u),
    }
  }
}

fn check_exam(state: &AppState, exam_type: &str) -> Result<(), ServeError> {
  if state.is_known_exam(exam_type) {
    Ok(())
  } else {
    Err(ServeError::UnknownExam(exam_type.to_string()))
  }
}

#[instrument(level = "info", skip(state))]
pub async fn next_question(
  state: &AppState,
  user_id: &str,
  exam_type: &str,
  target: Option<f64>,
) -> Result<NextQuestionOut, ServeError> {
  check_exam(state, exam_type)?;
  let target = target.filter(|t| t.is_finite() && *t > 0.0 && *t < 1.0);
  let (selection, origin) = state
    .next_question(user_id, exam_type, target)
    .await
    .map_err(ServeError::Unavailable)?;
  info!(
    target: "question",
    %user_id, %exam_type,
    id = %selection.question.id,
    origin = origin.as_str(),
    p = %format!("{:.2}", selection.probability),
    "Question served"
  );
  Ok(to_next_out(&selection, origin.as_str()))
}

/// Letter or full option text, case-insensitive.
pub fn is_correct(q: &Question, answer: &str) -> bool {
  let letter = normalize_choice(answer);
  if letter == q.correct_answer {
    return true;
  }
  let idx = OPTION_LETTERS.iter().position(|l| *l == q.correct_answer);
  match idx.and_then(|i| q.choices.get(i)) {
    Some(text) => text.trim().eq_ignore_ascii_case(answer.trim()),
    None => false,
  }
}

/// Grade, append to history, update item statistics.
///
/// The grade is returned even when persistence fails; `stats_recorded` tells the caller.
#[instrument(level = "info", skip(state, answer), fields(answer_len = answer.len()))]
pub async fn submit_answer(
  state: &AppState,
  user_id: &str,
  question_id: &str,
  answer: &str,
  response_time: Option<f64>,
) -> Result<AnswerOut, ServeError> {
  let question = match state.bank.get(question_id).await {
    Ok(Some(q)) => q,
    Ok(None) => return Err(ServeError::UnknownQuestion(question_id.to_string())),
    Err(e) => {
      error!(target: "question", %question_id, error = %e, "Question lookup failed");
      return Err(ServeError::Unavailable(Unavailable::CatalogUnavailable(e.to_string())));
    }
  };

  let correct = is_correct(&question, answer);
  let latency = response_time.filter(|t| t.is_finite() && *t >= 0.0);
  if response_time.is_some() && latency.is_none() {
    warn!(target: "question", %question_id, "Ignoring invalid response time");
  }

  let record = ResponseRecord {
    user_id: user_id.to_string(),
    item_id: question.id.clone(),
    category: question.exam_type.clone(),
    correct,
    latency_secs: latency,
    answered_at: Utc::now(),
  };
  let logged = match state.history.append(record).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "stats", %user_id, %question_id, error = %e, "Failed to append answer to history");
      false
    }
  };

  let stats_recorded = match state.selector.record_response(&question.id, correct, latency).await {
    Ok(stats) => {
      info!(
        target: "stats",
        %question_id,
        times_answered = stats.times_answered,
        rating = %format!("{:.2}", stats.difficulty_rating),
        "Item statistics updated"
      );
      logged
    }
    Err(e) => {
      error!(target: "stats", %question_id, error = %e, "Item statistics not updated");
      false
    }
  };

  info!(target: "question", %user_id, %question_id, %correct, stats_recorded, "Answer graded");
  Ok(AnswerOut {
    question_id: question.id,
    correct,
    expected: question.correct_answer,
    explanation: question.explanation,
    stats_recorded,
  })
}

#[instrument(level = "info", skip(state))]
pub async fn ability_summary(state: &AppState, user_id: &str, exam_type: &str) -> Result<AbilityOut, ServeError> {
  check_exam(state, exam_type)?;
  let ability = state.selector.ability(user_id, exam_type).await;
  let score = state.selector.abilities().score(user_id, exam_type).await;
  Ok(ability_out(exam_type, ability, score))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::parse_config;
  use crate::seeds::seed_questions;

  fn state() -> AppState {
    let mut cfg = parse_config("").unwrap();
    cfg.engine.retry.backoff_base_ms = 0;
    AppState::from_config(cfg, None)
  }

  #[test]
  fn grading_accepts_letter_or_text() {
    let q = seed_questions().into_iter().find(|q| q.id == "seed-gre-2").unwrap();
    assert!(is_correct(&q, "b"));
    assert!(is_correct(&q, "(B)"));
    assert!(is_correct(&q, " Terse "));
    assert!(!is_correct(&q, "A"));
    assert!(!is_correct(&q, "verbose"));
  }

  #[tokio::test]
  async fn answer_updates_history_and_stats() {
    let st = state();
    let out = submit_answer(&st, "u1", "seed-gmat-1", "B", Some(30.0)).await.unwrap();
    assert!(out.correct);
    assert!(out.stats_recorded);
    assert_eq!(out.expected, "B");

    let stats = st.stats.get("seed-gmat-1").await.unwrap().unwrap();
    assert_eq!(stats.times_answered, 1);
    assert_eq!(stats.correct_percentage, 100.0);
    assert_eq!(stats.average_latency_secs, Some(30.0));

    let history = st
      .history
      .recent("u1", "GMAT", chrono::DateTime::<Utc>::MIN_UTC, 10)
      .await
      .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].correct);
  }

  #[tokio::test]
  async fn negative_response_time_is_dropped() {
    let st = state();
    submit_answer(&st, "u1", "seed-gmat-2", "C", Some(-5.0)).await.unwrap();
    let stats = st.stats.get("seed-gmat-2").await.unwrap().unwrap();
    assert_eq!(stats.average_latency_secs, None);
    assert_eq!(stats.correct_percentage, 0.0);
  }

  #[tokio::test]
  async fn unknown_question_and_exam_are_rejected() {
    let st = state();
    let err = submit_answer(&st, "u1", "nope", "A", None).await.unwrap_err();
    assert_eq!(err, ServeError::UnknownQuestion("nope".into()));

    let err = next_question(&st, "u1", "CHESS", None).await.unwrap_err();
    assert_eq!(err, ServeError::UnknownExam("CHESS".into()));
  }

  #[tokio::test]
  async fn served_question_is_not_repeated_right_after_answering() {
    let st = state();
    let first = next_question(&st, "u1", "GRE", None).await.unwrap();
    submit_answer(&st, "u1", &first.question.id, "A", None).await.unwrap();
    let second = next_question(&st, "u1", "GRE", None).await.unwrap();
    assert_ne!(first.question.id, second.question.id);
    assert!(!second.relaxed_recency);
  }

  #[tokio::test]
  async fn ability_starts_neutral() {
    let st = state();
    let a = ability_summary(&st, "new-user", "LSAT").await.unwrap();
    assert_eq!(a.ability, 0.0);
    assert_eq!(a.score, 50.0);
  }
}
