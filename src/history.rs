//! Per-learner attempt history and best scores on top of a [`KvStore`].
//!
//! The attempt list is the record of truth for games that keep one. Best scores
//! live in the shared `scores:{learner}` map, which other writers may also touch,
//! so every update takes the max with what is already stored there. Reads and
//! writes for one update happen inside a single critical section.

use std::{collections::BTreeMap, sync::{Arc, Mutex}};

use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::domain::{AttemptRecord, GameKind};
use crate::error::StoreError;
use crate::store::KvStore;

fn attempts_key(game: GameKind, learner: &str) -> String {
  format!("{}:{}", game.key(), learner)
}

fn scores_key(learner: &str) -> String {
  format!("scores:{learner}")
}

/// What an append produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
  pub record: AttemptRecord,
  pub best: u32,
}

pub struct AttemptHistory {
  store: Arc<dyn KvStore>,
  writer: Mutex<()>,
}

impl AttemptHistory {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self { store, writer: Mutex::new(()) }
  }

  pub fn attempts(&self, game: GameKind, learner: &str) -> Result<Vec<AttemptRecord>, StoreError> {
    match self.store.get(&attempts_key(game, learner))? {
      Some(v) => Ok(serde_json::from_value(v)?),
      None => Ok(Vec::new()),
    }
  }

  /// All best scores for a learner, keyed by game score name.
  pub fn scores(&self, learner: &str) -> Result<BTreeMap<String, u32>, StoreError> {
    match self.store.get(&scores_key(learner))? {
      Some(v) => Ok(serde_json::from_value(v)?),
      None => Ok(BTreeMap::new()),
    }
  }

  pub fn best(&self, game: GameKind, learner: &str) -> Result<Option<u32>, StoreError> {
    Ok(self.scores(learner)?.get(game.score_name()).copied())
  }

  /// Append a finished attempt and refresh the best score. The attempt number is
  /// assigned here from the stored list so concurrent sessions cannot collide.
  #[instrument(level = "info", skip_all, fields(game = game.key(), %learner, percentage = record.percentage))]
  pub fn record(&self, game: GameKind, learner: &str, mut record: AttemptRecord) -> Result<Recorded, StoreError> {
    let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;

    let mut attempts = self.attempts(game, learner)?;
    record.attempt_number = attempts.len() as u32 + 1;
    attempts.push(record.clone());
    let candidate = attempts.iter().map(|a| a.percentage).max().unwrap_or(0);

    self.store.set(&attempts_key(game, learner), serde_json::to_value(&attempts)?)?;
    let best = self.raise_best(game, learner, candidate)?;

    info!(target: "games", attempt = record.attempt_number, best, "Attempt recorded");
    Ok(Recorded { record, best })
  }

  /// Offer a finished run's percentage for a game without an attempt list.
  /// Returns the best after the update.
  #[instrument(level = "info", skip(self))]
  pub fn record_best(&self, game: GameKind, learner: &str, percentage: u32) -> Result<u32, StoreError> {
    let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
    let best = self.raise_best(game, learner, percentage)?;
    info!(target: "games", best, "Score recorded");
    Ok(best)
  }

  /// Caller holds `writer`.
  fn raise_best(&self, game: GameKind, learner: &str, candidate: u32) -> Result<u32, StoreError> {
    let stored = self.best(game, learner)?;
    let best = stored.unwrap_or(0).max(candidate);
    if stored != Some(best) {
      let mut patch = Map::new();
      patch.insert(game.score_name().to_string(), Value::from(best));
      self.store.merge(&scores_key(learner), Value::Object(patch))?;
    }
    Ok(best)
  }
}
