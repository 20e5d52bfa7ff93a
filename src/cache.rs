//! Bounded TTL cache for per-exam question pools.
//!
//! `CachedQuestionBank` wraps any `QuestionBank`. Pools are served from memory
//! until they expire; inserting a question drops that exam's entry and bumps its
//! generation, so a fetch that overlapped the insert is not cached.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::Question;
use crate::error::StoreError;
use crate::store::QuestionBank;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
  pub ttl_secs: u64,
  pub max_entries: usize,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self { ttl_secs: 300, max_entries: 64 }
  }
}

pub struct TtlCache<K, V> {
  ttl: Duration,
  max_entries: usize,
  entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
  pub fn new(ttl: Duration, max_entries: usize) -> Self {
    Self { ttl, max_entries: max_entries.max(1), entries: HashMap::new() }
  }

  pub fn get(&mut self, key: &K) -> Option<V> {
    self.get_at(key, Instant::now())
  }

  fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
    let expired = match self.entries.get(key) {
      Some((stored_at, _)) => now.duration_since(*stored_at) >= self.ttl,
      None => return None,
    };
    if expired {
      self.entries.remove(key);
      return None;
    }
    self.entries.get(key).map(|(_, v)| v.clone())
  }

  pub fn insert(&mut self, key: K, value: V) {
    self.insert_at(key, value, Instant::now())
  }

  fn insert_at(&mut self, key: K, value: V, now: Instant) {
    if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
      // Evict the oldest entry.
      if let Some(oldest) = self
        .entries
        .iter()
        .min_by_key(|(_, (stored_at, _))| *stored_at)
        .map(|(k, _)| k.clone())
      {
        self.entries.remove(&oldest);
      }
    }
    self.entries.insert(key, (now, value));
  }

  pub fn invalidate(&mut self, key: &K) {
    self.entries.remove(key);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

struct Pools {
  cache: TtlCache<String, Vec<Question>>,
  /// Bumped by every insert for the exam.
  generations: HashMap<String, u64>,
}

impl Pools {
  fn generation(&self, key: &str) -> u64 {
    self.generations.get(key).copied().unwrap_or(0)
  }
}

pub struct CachedQuestionBank<B> {
  inner: B,
  pools: Mutex<Pools>,
}

impl<B: QuestionBank> CachedQuestionBank<B> {
  pub fn new(inner: B, settings: &CacheSettings) -> Self {
    Self {
      inner,
      pools: Mutex::new(Pools {
        cache: TtlCache::new(Duration::from_secs(settings.ttl_secs), settings.max_entries),
        generations: HashMap::new(),
      }),
    }
  }
}

#[async_trait]
impl<B: QuestionBank> QuestionBank for CachedQuestionBank<B> {
  async fn questions_for(&self, exam_type: &str) -> Result<Vec<Question>, StoreError> {
    let key = exam_type.to_string();
    let generation = {
      let mut pools = self.pools.lock().await;
      if let Some(pool) = pools.cache.get(&key) {
        debug!(target: "question", %exam_type, size = pool.len(), "Pool cache hit");
        return Ok(pool);
      }
      pools.generation(&key)
    };

    let pool = self.inner.questions_for(exam_type).await?;

    let mut pools = self.pools.lock().await;
    if pools.generation(&key) == generation {
      pools.cache.insert(key, pool.clone());
    } else {
      debug!(target: "question", %exam_type, "Pool changed during fetch; not caching");
    }
    Ok(pool)
  }

  async fn get(&self, id: &str) -> Result<Option<Question>, StoreError> {
    self.inner.get(id).await
  }

  async fn insert(&self, question: Question) -> Result<(), StoreError> {
    let key = question.exam_type.clone();
    // A re-insert may move the question out of another exam's pool.
    let moved_from = match self.inner.get(&question.id).await {
      Ok(Some(prev)) if prev.exam_type != key => Some(prev.exam_type),
      _ => None,
    };
    self.inner.insert(question).await?;
    let mut pools = self.pools.lock().await;
    for k in std::iter::once(key).chain(moved_from) {
      pools.cache.invalidate(&k);
      *pools.generations.entry(k).or_insert(0) += 1;
    }
    Ok(())
  }

  async fn inventory(&self) -> Result<Vec<(String, usize)>, StoreError> {
    self.inner.inventory().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionSource;
  use crate::store::InMemoryQuestionBank;
  use chrono::Utc;
  use std::sync::Arc;
  use tokio::sync::{oneshot, Notify};

  fn lsat(id: &str) -> Question {
    Question {
      id: id.into(),
      exam_type: "LSAT".into(),
      subject: String::new(),
      difficulty: Default::default(),
      text: "?".into(),
      choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
      correct_answer: "B".into(),
      explanation: String::new(),
      topics: vec![],
      source: QuestionSource::Generated,
      created_at: Utc::now(),
    }
  }

  /// Takes its pool snapshot, then waits for `release` once before returning it.
  struct SlowBank {
    inner: InMemoryQuestionBank,
    fetched: Arc<Notify>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
  }

  #[async_trait]
  impl QuestionBank for SlowBank {
    async fn questions_for(&self, exam_type: &str) -> Result<Vec<Question>, StoreError> {
      let pool = self.inner.questions_for(exam_type).await?;
      let gate = self.release.lock().await.take();
      if let Some(rx) = gate {
        self.fetched.notify_one();
        let _ = rx.await;
      }
      Ok(pool)
    }
    async fn get(&self, id: &str) -> Result<Option<Question>, StoreError> {
      self.inner.get(id).await
    }
    async fn insert(&self, question: Question) -> Result<(), StoreError> {
      self.inner.insert(question).await
    }
    async fn inventory(&self) -> Result<Vec<(String, usize)>, StoreError> {
      self.inner.inventory().await
    }
  }

  #[test]
  fn entries_expire_after_ttl() {
    let mut c = TtlCache::new(Duration::from_secs(10), 4);
    let t0 = Instant::now();
    c.insert_at("k", 1, t0);
    assert_eq!(c.get_at(&"k", t0 + Duration::from_secs(5)), Some(1));
    assert_eq!(c.get_at(&"k", t0 + Duration::from_secs(10)), None);
    assert_eq!(c.len(), 0);
  }

  #[test]
  fn oldest_entry_is_evicted_when_full() {
    let mut c = TtlCache::new(Duration::from_secs(60), 2);
    let t0 = Instant::now();
    c.insert_at("a", 1, t0);
    c.insert_at("b", 2, t0 + Duration::from_secs(1));
    c.insert_at("c", 3, t0 + Duration::from_secs(2));
    let now = t0 + Duration::from_secs(3);
    assert_eq!(c.get_at(&"a", now), None);
    assert_eq!(c.get_at(&"b", now), Some(2));
    assert_eq!(c.get_at(&"c", now), Some(3));
  }

  #[tokio::test]
  async fn insert_invalidates_cached_pool() {
    let bank = CachedQuestionBank::new(InMemoryQuestionBank::new(), &CacheSettings::default());
    assert!(bank.questions_for("LSAT").await.unwrap().is_empty());
    bank.insert(lsat("l1")).await.unwrap();
    assert_eq!(bank.questions_for("LSAT").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn moving_a_question_refreshes_both_pools() {
    let bank = CachedQuestionBank::new(InMemoryQuestionBank::with_questions(vec![lsat("l1")]), &CacheSettings::default());
    assert_eq!(bank.questions_for("LSAT").await.unwrap().len(), 1);

    let mut moved = lsat("l1");
    moved.exam_type = "GRE".into();
    bank.insert(moved).await.unwrap();

    assert!(bank.questions_for("LSAT").await.unwrap().is_empty());
    assert_eq!(bank.questions_for("GRE").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn fetch_overlapping_an_insert_is_not_cached() {
    let (tx, rx) = oneshot::channel();
    let fetched = Arc::new(Notify::new());
    let slow = SlowBank {
      inner: InMemoryQuestionBank::new(),
      fetched: fetched.clone(),
      release: Mutex::new(Some(rx)),
    };
    let bank = Arc::new(CachedQuestionBank::new(slow, &CacheSettings::default()));

    let reader = {
      let bank = bank.clone();
      tokio::spawn(async move { bank.questions_for("LSAT").await })
    };
    fetched.notified().await;
    bank.insert(lsat("l1")).await.unwrap();
    tx.send(()).unwrap();

    // The overlapping read saw the old, empty pool.
    assert!(reader.await.unwrap().unwrap().is_empty());
    assert_eq!(bank.questions_for("LSAT").await.unwrap().len(), 1);
  }
}
