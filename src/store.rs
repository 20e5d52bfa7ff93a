//! Storage seams for the adaptive engine and their in-memory implementations.
//!
//! The engine only sees these traits:
//!   - `ResponseLog`  : append-only answer history (reader + writer)
//!   - `StatsStore`   : per-question aggregates, last commit wins
//!   - `QuestionBank` : questions grouped by exam type
//!
//! The in-memory versions hold each map behind a `tokio::sync::RwLock` and never
//! keep a guard across an await point.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{ItemStatistics, Question, ResponseRecord};
use crate::error::StoreError;

/// Answer history.
#[async_trait]
pub trait ResponseLog: Send + Sync {
  /// Most recent first, at most `limit` records answered at or after `since`.
  async fn recent(
    &self,
    user_id: &str,
    category: &str,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<ResponseRecord>, StoreError>;

  /// Ids of questions the user answered at or after `since`.
  async fn answered_since(
    &self,
    user_id: &str,
    category: &str,
    since: DateTime<Utc>,
  ) -> Result<HashSet<String>, StoreError>;

  async fn append(&self, record: ResponseRecord) -> Result<(), StoreError>;
}

/// Per-question statistics.
#[async_trait]
pub trait StatsStore: Send + Sync {
  async fn get(&self, item_id: &str) -> Result<Option<ItemStatistics>, StoreError>;

  /// Replace the stored record in one step.
  async fn commit(&self, stats: ItemStatistics) -> Result<(), StoreError>;
}

/// Question catalog.
#[async_trait]
pub trait QuestionBank: Send + Sync {
  async fn questions_for(&self, exam_type: &str) -> Result<Vec<Question>, StoreError>;

  async fn get(&self, id: &str) -> Result<Option<Question>, StoreError>;

  async fn insert(&self, question: Question) -> Result<(), StoreError>;

  /// Exam types with at least one question, with their counts.
  async fn inventory(&self) -> Result<Vec<(String, usize)>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryResponseLog {
  records: RwLock<Vec<ResponseRecord>>,
}

impl InMemoryResponseLog {
  pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl ResponseLog for InMemoryResponseLog {
  async fn recent(
    &self,
    user_id: &str,
    category: &str,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<ResponseRecord>, StoreError> {
    let records = self.records.read().await;
    let mut out: Vec<ResponseRecord> = records
      .iter()
      .filter(|r| r.user_id == user_id && r.category == category && r.answered_at >= since)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.answered_at.cmp(&a.answered_at));
    out.truncate(limit);
    Ok(out)
  }

  async fn answered_since(
    &self,
    user_id: &str,
    category: &str,
    since: DateTime<Utc>,
  ) -> Result<HashSet<String>, StoreError> {
    let records = self.records.read().await;
    Ok(records
      .iter()
      .filter(|r| r.user_id == user_id && r.category == category && r.answered_at >= since)
      .map(|r| r.item_id.clone())
      .collect())
  }

  async fn append(&self, record: ResponseRecord) -> Result<(), StoreError> {
    self.records.write().await.push(record);
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryStatsStore {
  by_item: RwLock<HashMap<String, ItemStatistics>>,
}

impl InMemoryStatsStore {
  pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
  async fn get(&self, item_id: &str) -> Result<Option<ItemStatistics>, StoreError> {
    Ok(self.by_item.read().await.get(item_id).cloned())
  }

  async fn commit(&self, stats: ItemStatistics) -> Result<(), StoreError> {
    self.by_item.write().await.insert(stats.item_id.clone(), stats);
    Ok(())
  }
}

/// Questions indexed by id and by exam type.
#[derive(Default)]
pub struct InMemoryQuestionBank {
  by_id: RwLock<HashMap<String, Question>>,
  by_exam: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryQuestionBank {
  pub fn new() -> Self { Self::default() }

  /// Build from an initial set. Later duplicates of an id are ignored.
  pub fn with_questions(questions: Vec<Question>) -> Self {
    let mut by_id = HashMap::<String, Question>::new();
    let mut by_exam = HashMap::<String, Vec<String>>::new();
    for q in questions {
      if by_id.contains_key(&q.id) {
        continue;
      }
      by_exam.entry(q.exam_type.clone()).or_default().push(q.id.clone());
      by_id.insert(q.id.clone(), q);
    }
    Self { by_id: RwLock::new(by_id), by_exam: RwLock::new(by_exam) }
  }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
  async fn questions_for(&self, exam_type: &str) -> Result<Vec<Question>, StoreError> {
    let ids = { self.by_exam.read().await.get(exam_type).cloned().unwrap_or_default() };
    let by_id = self.by_id.read().await;
    Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
  }

  async fn get(&self, id: &str) -> Result<Option<Question>, StoreError> {
    Ok(self.by_id.read().await.get(id).cloned())
  }

  async fn insert(&self, question: Question) -> Result<(), StoreError> {
    let mut by_id = self.by_id.write().await;
    let mut by_exam = self.by_exam.write().await;
    let id = question.id.clone();
    let previous_exam = by_id.get(&id).map(|q| q.exam_type.clone());
    if previous_exam.as_deref() != Some(question.exam_type.as_str()) {
      if let Some(old) = previous_exam {
        if let Some(ids) = by_exam.get_mut(&old) {
          ids.retain(|i| *i != id);
        }
      }
      by_exam.entry(question.exam_type.clone()).or_default().push(id.clone());
    }
    by_id.insert(id, question);
    Ok(())
  }

  async fn inventory(&self) -> Result<Vec<(String, usize)>, StoreError> {
    let by_exam = self.by_exam.read().await;
    let mut out: Vec<(String, usize)> = by_exam
      .iter()
      .filter(|(_, ids)| !ids.is_empty())
      .map(|(exam, ids)| (exam.clone(), ids.len()))
      .collect();
    out.sort();
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionSource;
  use chrono::Duration;

  fn record(user: &str, item: &str, minutes_ago: i64, now: DateTime<Utc>) -> ResponseRecord {
    ResponseRecord {
      user_id: user.into(),
      item_id: item.into(),
      category: "GRE".into(),
      correct: true,
      latency_secs: None,
      answered_at: now - Duration::minutes(minutes_ago),
    }
  }

  fn question(id: &str, exam: &str) -> Question {
    Question {
      id: id.into(),
      exam_type: exam.into(),
      subject: String::new(),
      difficulty: Default::default(),
      text: "?".into(),
      choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
      correct_answer: "A".into(),
      explanation: String::new(),
      topics: vec![],
      source: QuestionSource::Seed,
      created_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn recent_is_newest_first_and_limited() {
    let now = Utc::now();
    let log = InMemoryResponseLog::new();
    for (i, m) in [30, 10, 20, 5].iter().enumerate() {
      log.append(record("u1", &format!("q{}", i), *m, now)).await.unwrap();
    }
    log.append(record("u2", "other", 1, now)).await.unwrap();

    let out = log.recent("u1", "GRE", now - Duration::hours(1), 3).await.unwrap();
    let ids: Vec<_> = out.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["q3", "q1", "q2"]);
  }

  #[tokio::test]
  async fn answered_since_respects_window() {
    let now = Utc::now();
    let log = InMemoryResponseLog::new();
    log.append(record("u1", "old", 60 * 48, now)).await.unwrap();
    log.append(record("u1", "fresh", 5, now)).await.unwrap();
    let ids = log.answered_since("u1", "GRE", now - Duration::hours(24)).await.unwrap();
    assert!(ids.contains("fresh"));
    assert!(!ids.contains("old"));
  }

  #[tokio::test]
  async fn bank_indexes_by_exam_and_ignores_duplicate_ids() {
    let bank = InMemoryQuestionBank::with_questions(vec![
      question("a", "GRE"),
      question("a", "GMAT"),
      question("b", "GMAT"),
    ]);
    assert_eq!(bank.questions_for("GRE").await.unwrap().len(), 1);
    assert_eq!(bank.questions_for("GMAT").await.unwrap().len(), 1);

    bank.insert(question("c", "GMAT")).await.unwrap();
    assert_eq!(
      bank.inventory().await.unwrap(),
      vec![("GMAT".to_string(), 2), ("GRE".to_string(), 1)]
    );
  }

  #[tokio::test]
  async fn reinsert_under_another_exam_moves_the_question() {
    let bank = InMemoryQuestionBank::with_questions(vec![question("q1", "GRE"), question("q2", "GRE")]);
    bank.insert(question("q1", "GMAT")).await.unwrap();

    let gre: Vec<_> = bank.questions_for("GRE").await.unwrap().into_iter().map(|q| q.id).collect();
    assert_eq!(gre, vec!["q2".to_string()]);
    let gmat = bank.questions_for("GMAT").await.unwrap();
    assert_eq!(gmat.len(), 1);
    assert_eq!(gmat[0].exam_type, "GMAT");

    // Same exam: updated in place, not listed twice.
    bank.insert(question("q2", "GRE")).await.unwrap();
    assert_eq!(bank.questions_for("GRE").await.unwrap().len(), 1);
    assert_eq!(bank.inventory().await.unwrap(), vec![("GMAT".to_string(), 1), ("GRE".to_string(), 1)]);
  }

  #[tokio::test]
  async fn stats_commit_replaces_record() {
    let store = InMemoryStatsStore::new();
    let mut s = ItemStatistics::new("q1", Utc::now());
    store.commit(s.clone()).await.unwrap();
    s.times_answered = 4;
    store.commit(s.clone()).await.unwrap();
    assert_eq!(store.get("q1").await.unwrap(), Some(s));
    assert_eq!(store.get("missing").await.unwrap(), None);
  }
}
