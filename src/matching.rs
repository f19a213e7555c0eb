//! Term/definition pair matching over a shuffled deck.
//!
//! Flips go through a two-card buffer. Once two cards are up the engine hands back a
//! [`PendingResolution`]; the caller waits out its delay and feeds it to [`MatchingGame::apply`].
//! Every resolution carries the epoch it was issued in, and `reset` moves the epoch on,
//! so timers that fire after a reset are ignored.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GameTimings;
use crate::domain::MatchingPair;

const BUFFER_CAPACITY: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardRole {
  Term,
  Definition,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCard {
  pub id: usize,
  pub content: String,
  pub role: CardRole,
  pub pair_id: usize,
  pub flipped: bool,
  pub matched: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
  Idle,
  OneFlipped,
  Resolving,
  Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
  /// Same pair: both cards become matched.
  Settle,
  /// Different pairs: both cards turn back over.
  Revert,
}

/// A resolution scheduled to run after `delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingResolution {
  pub epoch: u64,
  pub kind: ResolutionKind,
  pub cards: [usize; 2],
  pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlipOutcome {
  Ignored,
  Flipped,
  Resolving(PendingResolution),
}

/// Read-only view handed to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingSnapshot {
  pub cards: Vec<MatchCard>,
  pub moves: u32,
  pub phase: MatchPhase,
  pub epoch: u64,
}

pub struct MatchingGame {
  pairs: Vec<MatchingPair>,
  cards: Vec<MatchCard>,
  buffer: Vec<usize>,
  moves: u32,
  epoch: u64,
  timings: GameTimings,
  rng: StdRng,
}

impl MatchingGame {
  pub fn new(pairs: Vec<MatchingPair>, timings: GameTimings) -> Self {
    Self::with_rng(pairs, timings, StdRng::from_entropy())
  }

  pub fn with_rng(pairs: Vec<MatchingPair>, timings: GameTimings, rng: StdRng) -> Self {
    let mut game = Self { pairs, cards: Vec::new(), buffer: Vec::new(), moves: 0, epoch: 0, timings, rng };
    game.deal();
    game
  }

  fn deal(&mut self) {
    let mut cards: Vec<MatchCard> = self
      .pairs
      .iter()
      .enumerate()
      .flat_map(|(pair_id, p)| {
        [
          MatchCard { id: 2 * pair_id, content: p.term.clone(), role: CardRole::Term, pair_id, flipped: false, matched: false },
          MatchCard {
            id: 2 * pair_id + 1,
            content: p.definition.clone(),
            role: CardRole::Definition,
            pair_id,
            flipped: false,
            matched: false,
          },
        ]
      })
      .collect();

    // Fisher-Yates shuffle
    for i in (1..cards.len()).rev() {
      let j = self.rng.gen_range(0..=i);
      cards.swap(i, j);
    }
    self.cards = cards;
  }

  /// Turn a card face up. Ignored for unknown, matched or face-up cards, when two
  /// cards are already waiting, and once the game is complete.
  pub fn flip(&mut self, card_id: usize) -> FlipOutcome {
    if self.is_complete() || self.buffer.len() >= BUFFER_CAPACITY {
      debug!(target: "games", card_id, "Flip ignored: game busy or complete");
      return FlipOutcome::Ignored;
    }
    let Some(card) = self.cards.iter_mut().find(|c| c.id == card_id) else {
      debug!(target: "games", card_id, "Flip ignored: unknown card");
      return FlipOutcome::Ignored;
    };
    if card.matched || card.flipped {
      debug!(target: "games", card_id, "Flip ignored: card already face up");
      return FlipOutcome::Ignored;
    }
    card.flipped = true;
    self.buffer.push(card_id);

    if self.buffer.len() < BUFFER_CAPACITY {
      return FlipOutcome::Flipped;
    }

    self.moves += 1;
    let cards = [self.buffer[0], self.buffer[1]];
    let same_pair = self.pair_of(cards[0]) == self.pair_of(cards[1]);
    let (kind, delay) = if same_pair {
      (ResolutionKind::Settle, self.timings.settle_delay())
    } else {
      (ResolutionKind::Revert, self.timings.revert_delay())
    };
    debug!(target: "games", moves = self.moves, ?kind, "Two cards up");
    FlipOutcome::Resolving(PendingResolution { epoch: self.epoch, kind, cards, delay })
  }

  /// Run a resolution whose delay has elapsed. Returns false if it no longer applies.
  pub fn apply(&mut self, resolution: &PendingResolution) -> bool {
    if resolution.epoch != self.epoch || self.buffer.as_slice() != resolution.cards.as_slice() {
      debug!(target: "games", epoch = resolution.epoch, current = self.epoch, "Stale resolution dropped");
      return false;
    }
    for card in self.cards.iter_mut().filter(|c| resolution.cards.contains(&c.id)) {
      match resolution.kind {
        ResolutionKind::Settle => card.matched = true,
        ResolutionKind::Revert => card.flipped = false,
      }
    }
    self.buffer.clear();
    true
  }

  /// Reshuffle, turn everything face down and zero the move counter.
  pub fn reset(&mut self) {
    self.epoch += 1;
    self.buffer.clear();
    self.moves = 0;
    self.deal();
  }

  /// Swap in new pairs and start over. Resolutions issued for the old deck go stale.
  pub fn load(&mut self, pairs: Vec<MatchingPair>) {
    self.pairs = pairs;
    self.reset();
  }

  pub fn is_complete(&self) -> bool {
    !self.cards.is_empty() && self.cards.iter().all(|c| c.matched)
  }

  pub fn phase(&self) -> MatchPhase {
    if self.is_complete() {
      return MatchPhase::Complete;
    }
    match self.buffer.len() {
      0 => MatchPhase::Idle,
      1 => MatchPhase::OneFlipped,
      _ => MatchPhase::Resolving,
    }
  }

  pub fn moves(&self) -> u32 {
    self.moves
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn cards(&self) -> &[MatchCard] {
    &self.cards
  }

  pub fn snapshot(&self) -> MatchingSnapshot {
    MatchingSnapshot { cards: self.cards.clone(), moves: self.moves, phase: self.phase(), epoch: self.epoch }
  }

  fn pair_of(&self, card_id: usize) -> Option<usize> {
    self.cards.iter().find(|c| c.id == card_id).map(|c| c.pair_id)
  }
}
