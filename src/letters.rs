//! Upper/lower case letter matching with a sliding window over A-Z.
//!
//! Five letters are in play at a time. Every answer, right or wrong, retires the
//! letter and the next unintroduced one slides in, until the alphabet runs out.

use chrono::Utc;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::domain::{percentage, AttemptRecord};

pub const TOTAL_LETTERS: u32 = 26;
pub const WINDOW_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LetterPair {
  pub upper: char,
  pub lower: char,
}

fn letter_at(index: usize) -> LetterPair {
  let upper = (b'A' + index as u8) as char;
  LetterPair { upper, lower: upper.to_ascii_lowercase() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LetterOutcome {
  /// The letter was not in play.
  Ignored,
  Resolved { correct: bool },
  /// The last letter was resolved. The attempt waits in [`LetterGame::pending_record`]
  /// until it has been stored.
  Completed { correct: bool },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterSnapshot {
  pub window: Vec<LetterPair>,
  /// Lowercase letters of the window in display order.
  pub choices: Vec<char>,
  pub remaining: usize,
  pub correct: u32,
  pub attempts: u32,
  pub accuracy: u32,
  pub attempt_number: u32,
  pub complete: bool,
}

pub struct LetterGame {
  window: Vec<LetterPair>,
  choices: Vec<char>,
  cursor: usize,
  correct: u32,
  attempts: u32,
  attempt_number: u32,
  pending: Option<AttemptRecord>,
  rng: StdRng,
}

impl LetterGame {
  /// Start a fresh attempt for a learner who already has `prior_attempts` on record.
  pub fn new(prior_attempts: usize) -> Self {
    Self::with_rng(prior_attempts, StdRng::from_entropy())
  }

  pub fn with_rng(prior_attempts: usize, rng: StdRng) -> Self {
    let mut game = Self {
      window: Vec::with_capacity(WINDOW_SIZE),
      choices: Vec::with_capacity(WINDOW_SIZE),
      cursor: 0,
      correct: 0,
      attempts: 0,
      attempt_number: 0,
      pending: None,
      rng,
    };
    game.reset(prior_attempts);
    game
  }

  /// Drop the attempt in progress. History lives elsewhere and is untouched.
  pub fn reset(&mut self, prior_attempts: usize) {
    self.window.clear();
    self.cursor = 0;
    self.correct = 0;
    self.attempts = 0;
    self.attempt_number = prior_attempts as u32 + 1;
    self.pending = None;
    self.refill();
  }

  /// Answer `upper` with `lower`. The letter leaves the window either way.
  pub fn resolve(&mut self, upper: char, lower: char) -> LetterOutcome {
    let upper = upper.to_ascii_uppercase();
    let Some(pos) = self.window.iter().position(|p| p.upper == upper) else {
      debug!(target: "games", %upper, "Letter not in play");
      return LetterOutcome::Ignored;
    };
    let pair = self.window.remove(pos);
    let correct = pair.lower == lower;
    self.attempts += 1;
    if correct {
      self.correct += 1;
    }
    self.refill();
    debug!(target: "games", %upper, correct, remaining = self.remaining(), "Letter resolved");

    if self.is_complete() {
      self.pending = Some(AttemptRecord::new(self.attempt_number, self.correct, TOTAL_LETTERS, Utc::now()));
      return LetterOutcome::Completed { correct };
    }
    LetterOutcome::Resolved { correct }
  }

  fn refill(&mut self) {
    while self.window.len() < WINDOW_SIZE && self.cursor < TOTAL_LETTERS as usize {
      self.window.push(letter_at(self.cursor));
      self.cursor += 1;
    }
    self.choices = self.window.iter().map(|p| p.lower).collect();
    self.choices.shuffle(&mut self.rng);
  }

  /// The finished attempt, until [`LetterGame::mark_recorded`] is called.
  pub fn pending_record(&self) -> Option<&AttemptRecord> {
    self.pending.as_ref()
  }

  pub fn mark_recorded(&mut self) {
    self.pending = None;
  }

  pub fn is_complete(&self) -> bool {
    self.window.is_empty() && self.cursor >= TOTAL_LETTERS as usize
  }

  /// Letters still unresolved, including the ones in the window.
  pub fn remaining(&self) -> usize {
    self.window.len() + (TOTAL_LETTERS as usize - self.cursor)
  }

  pub fn accuracy(&self) -> u32 {
    percentage(self.correct, self.attempts)
  }

  pub fn attempt_number(&self) -> u32 {
    self.attempt_number
  }

  pub fn window(&self) -> &[LetterPair] {
    &self.window
  }

  pub fn snapshot(&self) -> LetterSnapshot {
    LetterSnapshot {
      window: self.window.clone(),
      choices: self.choices.clone(),
      remaining: self.remaining(),
      correct: self.correct,
      attempts: self.attempts,
      accuracy: self.accuracy(),
      attempt_number: self.attempt_number,
      complete: self.is_complete(),
    }
  }
}
