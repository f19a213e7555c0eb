//! Alphabet exercises: filling the caterpillar's missing letters, naming the first
//! letter of a picture, and matching a picture to its word.
//!
//! Every run ends with a percentage for the learner's best score. A finished run
//! reports that score as unsaved until the caller confirms it was stored, so a
//! failed write can be retried instead of lost.

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{percentage, GameKind};

const ALPHABET: [char; 26] = [
  'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W',
  'X', 'Y', 'Z',
];

/// Caterpillar segments that start empty, in the order they are asked for.
pub const CATERPILLAR_GAPS: [char; 9] = ['C', 'G', 'I', 'L', 'M', 'P', 'T', 'U', 'Z'];

/// (word, picture, description)
const FIRST_LETTER_PICTURES: [(&str, &str, &str); 10] = [
  ("Cat", "🐱", "A cute furry pet"),
  ("Duck", "🦆", "A water bird that quacks"),
  ("Ice Cream", "🍦", "A cold sweet treat"),
  ("Knife", "🔪", "A tool for cutting"),
  ("Orange", "🍊", "A round citrus fruit"),
  ("Leaf", "🍃", "Green part of a plant"),
  ("Jug", "🏺", "A container for liquids"),
  ("Flower", "🌸", "A colorful bloom"),
  ("Tree", "🌳", "A tall plant with branches"),
  ("Hat", "👒", "Something you wear on your head"),
];

const PICTURE_WORDS: [&str; 14] = [
  "cup", "apple", "cat", "axe", "cake", "chair", "ant", "cap", "bird", "ball", "book", "bee", "cow", "bag",
];

const PICTURE_WORD_CHOICES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exercise {
  AlphabetCaterpillar,
  FirstLetterPictures,
  PictureWordMatch,
}

impl Exercise {
  pub fn game(self) -> GameKind {
    match self {
      Exercise::AlphabetCaterpillar => GameKind::AlphabetCaterpillar,
      Exercise::FirstLetterPictures => GameKind::FirstLetterPictures,
      Exercise::PictureWordMatch => GameKind::PictureWordMatch,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExerciseOutcome {
  /// Not a valid pick right now.
  Ignored,
  Answered { correct: bool, expected: String },
  /// The last step was answered.
  Completed { correct: bool, expected: String, percentage: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prompt {
  pub text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub picture: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hint: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSnapshot {
  pub exercise: Exercise,
  pub prompt: Option<Prompt>,
  pub options: Vec<String>,
  pub step: usize,
  pub total_steps: usize,
  pub correct: u32,
  pub attempts: u32,
  pub percentage: u32,
  pub complete: bool,
  /// Alphabet position of the caterpillar segment being asked for.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub gap: Option<usize>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub filled: Vec<char>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub failed: Vec<char>,
}

fn outcome(correct: bool, expected: String, complete: bool, percentage: u32) -> ExerciseOutcome {
  if complete {
    ExerciseOutcome::Completed { correct, expected, percentage }
  } else {
    ExerciseOutcome::Answered { correct, expected }
  }
}

trait ExerciseRun: Send {
  fn answer(&mut self, choice: &str) -> ExerciseOutcome;
  fn reset(&mut self);
  fn is_complete(&self) -> bool;
  fn percentage(&self) -> u32;
  fn snapshot(&self) -> ExerciseSnapshot;
  fn saved(&self) -> bool;
  fn set_saved(&mut self);
}

/// Nine gaps in A-Z, asked for in alphabetical order. A wrong pick still fills the
/// gap with the right letter but counts it as failed.
pub struct CaterpillarGame {
  filled: Vec<char>,
  failed: Vec<char>,
  step: usize,
  attempts: u32,
  saved: bool,
}

impl Default for CaterpillarGame {
  fn default() -> Self {
    let mut game = Self { filled: Vec::new(), failed: Vec::new(), step: 0, attempts: 0, saved: false };
    game.reset();
    game
  }
}

impl CaterpillarGame {
  fn target(&self) -> Option<char> {
    CATERPILLAR_GAPS.get(self.step).copied()
  }

  /// Letters in place, pre-filled ones included, minus the failed ones.
  fn correct(&self) -> u32 {
    (self.filled.len() - self.failed.len()) as u32
  }
}

impl ExerciseRun for CaterpillarGame {
  fn answer(&mut self, choice: &str) -> ExerciseOutcome {
    let mut chars = choice.trim().chars();
    let (Some(letter), None) = (chars.next(), chars.next()) else {
      return ExerciseOutcome::Ignored;
    };
    let letter = letter.to_ascii_uppercase();
    let Some(target) = self.target() else {
      return ExerciseOutcome::Ignored;
    };
    if !letter.is_ascii_uppercase() || self.filled.contains(&letter) {
      debug!(target: "games", %letter, "Caterpillar pick ignored");
      return ExerciseOutcome::Ignored;
    }

    self.attempts += 1;
    let correct = letter == target;
    self.filled.push(target);
    if !correct {
      self.failed.push(target);
    }
    self.step += 1;
    debug!(target: "games", %letter, %target, correct, step = self.step, "Caterpillar pick");
    outcome(correct, target.to_string(), self.is_complete(), self.percentage())
  }

  fn reset(&mut self) {
    self.filled = ALPHABET.iter().copied().filter(|c| !CATERPILLAR_GAPS.contains(c)).collect();
    self.failed.clear();
    self.step = 0;
    self.attempts = 0;
    self.saved = false;
  }

  fn is_complete(&self) -> bool {
    self.step >= CATERPILLAR_GAPS.len()
  }

  fn percentage(&self) -> u32 {
    percentage(self.correct(), ALPHABET.len() as u32)
  }

  fn snapshot(&self) -> ExerciseSnapshot {
    let mut filled = self.filled.clone();
    filled.sort_unstable();
    ExerciseSnapshot {
      exercise: Exercise::AlphabetCaterpillar,
      prompt: None,
      options: ALPHABET.iter().filter(|c| !self.filled.contains(c)).map(|c| c.to_string()).collect(),
      step: self.step,
      total_steps: CATERPILLAR_GAPS.len(),
      correct: self.correct(),
      attempts: self.attempts,
      percentage: self.percentage(),
      complete: self.is_complete(),
      gap: self.target().and_then(|t| ALPHABET.iter().position(|c| *c == t)),
      filled,
      failed: self.failed.clone(),
    }
  }

  fn saved(&self) -> bool {
    self.saved
  }

  fn set_saved(&mut self) {
    self.saved = true;
  }
}

#[derive(Clone, Debug)]
struct Round {
  prompt: Prompt,
  answer: String,
  options: Vec<String>,
}

/// A fixed number of rounds, one answer each, right or wrong.
pub struct RoundGame {
  exercise: Exercise,
  rounds: Vec<Round>,
  current: usize,
  correct: u32,
  attempts: u32,
  saved: bool,
  rng: StdRng,
}

impl RoundGame {
  pub fn new(exercise: Exercise, rng: StdRng) -> Self {
    let mut game = Self { exercise, rounds: Vec::new(), current: 0, correct: 0, attempts: 0, saved: false, rng };
    game.reset();
    game
  }

  fn first_letter_rounds() -> Vec<Round> {
    let letters: Vec<String> = ALPHABET.iter().map(|c| c.to_string()).collect();
    FIRST_LETTER_PICTURES
      .iter()
      .map(|(word, picture, description)| Round {
        prompt: Prompt {
          text: format!("What is the first letter of {word}?"),
          picture: Some(picture.to_string()),
          hint: Some(description.to_string()),
        },
        answer: word[..1].to_ascii_uppercase(),
        options: letters.clone(),
      })
      .collect()
  }

  /// Words in a fresh order, each offered with three other words.
  fn picture_word_rounds(rng: &mut StdRng) -> Vec<Round> {
    let mut words = PICTURE_WORDS.to_vec();
    words.shuffle(rng);
    words
      .iter()
      .map(|word| {
        let mut options: Vec<String> = PICTURE_WORDS.iter().filter(|w| *w != word).map(|w| w.to_string()).collect();
        options.shuffle(rng);
        options.truncate(PICTURE_WORD_CHOICES - 1);
        options.push(word.to_string());
        options.shuffle(rng);
        Round {
          prompt: Prompt { text: "What is this?".into(), picture: Some(format!("/images/{word}.png")), hint: None },
          answer: word.to_string(),
          options,
        }
      })
      .collect()
  }
}

impl ExerciseRun for RoundGame {
  fn answer(&mut self, choice: &str) -> ExerciseOutcome {
    let Some(round) = self.rounds.get(self.current) else {
      return ExerciseOutcome::Ignored;
    };
    let Some(picked) = round.options.iter().find(|o| o.eq_ignore_ascii_case(choice.trim())) else {
      debug!(target: "games", exercise = ?self.exercise, choice, "Answer not among the options");
      return ExerciseOutcome::Ignored;
    };
    let correct = *picked == round.answer;
    let expected = round.answer.clone();

    self.attempts += 1;
    if correct {
      self.correct += 1;
    }
    self.current += 1;
    debug!(target: "games", exercise = ?self.exercise, correct, step = self.current, "Round answered");
    outcome(correct, expected, self.is_complete(), self.percentage())
  }

  fn reset(&mut self) {
    self.rounds = match self.exercise {
      Exercise::PictureWordMatch => Self::picture_word_rounds(&mut self.rng),
      _ => Self::first_letter_rounds(),
    };
    self.current = 0;
    self.correct = 0;
    self.attempts = 0;
    self.saved = false;
  }

  fn is_complete(&self) -> bool {
    self.current >= self.rounds.len()
  }

  fn percentage(&self) -> u32 {
    percentage(self.correct, self.rounds.len() as u32)
  }

  fn snapshot(&self) -> ExerciseSnapshot {
    let round = self.rounds.get(self.current);
    ExerciseSnapshot {
      exercise: self.exercise,
      prompt: round.map(|r| r.prompt.clone()),
      options: round.map(|r| r.options.clone()).unwrap_or_default(),
      step: self.current,
      total_steps: self.rounds.len(),
      correct: self.correct,
      attempts: self.attempts,
      percentage: self.percentage(),
      complete: self.is_complete(),
      gap: None,
      filled: Vec::new(),
      failed: Vec::new(),
    }
  }

  fn saved(&self) -> bool {
    self.saved
  }

  fn set_saved(&mut self) {
    self.saved = true;
  }
}

/// One run of every exercise for a session.
pub struct ExerciseBoard {
  caterpillar: CaterpillarGame,
  first_letters: RoundGame,
  picture_words: RoundGame,
}

impl Default for ExerciseBoard {
  fn default() -> Self {
    Self::with_rng(StdRng::from_entropy())
  }
}

impl ExerciseBoard {
  pub fn with_rng(mut rng: StdRng) -> Self {
    Self {
      caterpillar: CaterpillarGame::default(),
      first_letters: RoundGame::new(Exercise::FirstLetterPictures, StdRng::seed_from_u64(rng.gen())),
      picture_words: RoundGame::new(Exercise::PictureWordMatch, StdRng::seed_from_u64(rng.gen())),
    }
  }

  fn run(&self, exercise: Exercise) -> &dyn ExerciseRun {
    match exercise {
      Exercise::AlphabetCaterpillar => &self.caterpillar,
      Exercise::FirstLetterPictures => &self.first_letters,
      Exercise::PictureWordMatch => &self.picture_words,
    }
  }

  fn run_mut(&mut self, exercise: Exercise) -> &mut dyn ExerciseRun {
    match exercise {
      Exercise::AlphabetCaterpillar => &mut self.caterpillar,
      Exercise::FirstLetterPictures => &mut self.first_letters,
      Exercise::PictureWordMatch => &mut self.picture_words,
    }
  }

  pub fn answer(&mut self, exercise: Exercise, choice: &str) -> ExerciseOutcome {
    self.run_mut(exercise).answer(choice)
  }

  pub fn reset(&mut self, exercise: Exercise) {
    self.run_mut(exercise).reset();
  }

  pub fn snapshot(&self, exercise: Exercise) -> ExerciseSnapshot {
    self.run(exercise).snapshot()
  }

  /// Final percentage of a finished run that has not been stored yet.
  pub fn unsaved_score(&self, exercise: Exercise) -> Option<u32> {
    let run = self.run(exercise);
    (run.is_complete() && !run.saved()).then(|| run.percentage())
  }

  pub fn mark_saved(&mut self, exercise: Exercise) {
    self.run_mut(exercise).set_saved();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn board() -> ExerciseBoard {
    ExerciseBoard::with_rng(StdRng::seed_from_u64(11))
  }

  /// Answer with `pick` until the run reports completion. Returns the final outcome.
  fn play(board: &mut ExerciseBoard, exercise: Exercise, mut pick: impl FnMut(&ExerciseSnapshot) -> String) -> ExerciseOutcome {
    for _ in 0..64 {
      let snap = board.snapshot(exercise);
      let outcome = board.answer(exercise, &pick(&snap));
      assert_ne!(outcome, ExerciseOutcome::Ignored, "pick for step {} was ignored", snap.step);
      if matches!(outcome, ExerciseOutcome::Completed { .. }) {
        return outcome;
      }
    }
    panic!("{exercise:?} never completed");
  }

  fn expected_caterpillar(snap: &ExerciseSnapshot) -> String {
    CATERPILLAR_GAPS[snap.step].to_string()
  }

  #[test]
  fn caterpillar_starts_with_seventeen_letters() {
    let b = board();
    let snap = b.snapshot(Exercise::AlphabetCaterpillar);
    assert_eq!(snap.filled.len(), 17);
    assert_eq!(snap.options.len(), 9);
    assert_eq!(snap.gap, Some(2));
    assert_eq!(snap.correct, 17);
    assert_eq!(snap.percentage, 65);
  }

  #[test]
  fn caterpillar_perfect_run_scores_full_marks() {
    let mut b = board();
    let done = play(&mut b, Exercise::AlphabetCaterpillar, expected_caterpillar);
    assert_eq!(done, ExerciseOutcome::Completed { correct: true, expected: "Z".into(), percentage: 100 });
    assert_eq!(b.unsaved_score(Exercise::AlphabetCaterpillar), Some(100));
  }

  #[test]
  fn caterpillar_wrong_pick_fills_the_gap_as_failed() {
    let mut b = board();
    let ex = Exercise::AlphabetCaterpillar;
    // Already in place.
    assert_eq!(b.answer(ex, "A"), ExerciseOutcome::Ignored);
    assert_eq!(b.answer(ex, "7"), ExerciseOutcome::Ignored);
    assert_eq!(b.answer(ex, "g"), ExerciseOutcome::Answered { correct: false, expected: "C".into() });

    let snap = b.snapshot(ex);
    assert_eq!(snap.failed, vec!['C']);
    assert!(snap.filled.contains(&'C'));
    assert!(!snap.filled.contains(&'G'));
    assert_eq!(snap.gap, Some(6));
    assert_eq!((snap.correct, snap.attempts), (17, 1));

    assert_eq!(b.answer(ex, "G"), ExerciseOutcome::Answered { correct: true, expected: "G".into() });
    let done = play(&mut b, ex, expected_caterpillar);
    // 25 of 26 letters right.
    assert!(matches!(done, ExerciseOutcome::Completed { percentage: 96, .. }));
    assert_eq!(b.answer(ex, "Q"), ExerciseOutcome::Ignored);
  }

  #[test]
  fn first_letter_pictures_keep_their_order() {
    let mut b = board();
    let ex = Exercise::FirstLetterPictures;
    let snap = b.snapshot(ex);
    assert_eq!(snap.total_steps, 10);
    assert_eq!(snap.options.len(), 26);
    assert_eq!(snap.prompt.as_ref().map(|p| p.text.as_str()), Some("What is the first letter of Cat?"));

    assert_eq!(b.answer(ex, "?"), ExerciseOutcome::Ignored);
    assert_eq!(b.answer(ex, "k"), ExerciseOutcome::Answered { correct: false, expected: "C".into() });
    assert_eq!(b.answer(ex, "D"), ExerciseOutcome::Answered { correct: true, expected: "D".into() });

    let answers = ["I", "K", "O", "L", "J", "F", "T", "H"];
    let mut i = 0;
    let done = play(&mut b, ex, |_| {
      i += 1;
      answers[i - 1].to_string()
    });
    assert!(matches!(done, ExerciseOutcome::Completed { correct: true, percentage: 90, .. }));
    assert_eq!(b.snapshot(ex).prompt, None);
  }

  #[test]
  fn picture_words_offer_four_distinct_choices() {
    let mut b = board();
    let ex = Exercise::PictureWordMatch;
    let mut seen = Vec::new();
    let done = play(&mut b, ex, |snap| {
      assert_eq!(snap.options.len(), 4);
      let mut unique = snap.options.clone();
      unique.sort();
      unique.dedup();
      assert_eq!(unique.len(), 4);
      let picture = snap.prompt.as_ref().and_then(|p| p.picture.clone()).unwrap();
      let word = picture.trim_start_matches("/images/").trim_end_matches(".png").to_string();
      assert!(snap.options.contains(&word));
      seen.push(word.clone());
      word
    });
    assert!(matches!(done, ExerciseOutcome::Completed { percentage: 100, .. }));
    seen.sort();
    let mut all: Vec<String> = PICTURE_WORDS.iter().map(|w| w.to_string()).collect();
    all.sort();
    assert_eq!(seen, all);
  }

  #[test]
  fn unsaved_score_clears_once_saved_and_on_reset() {
    let mut b = board();
    let ex = Exercise::PictureWordMatch;
    assert_eq!(b.unsaved_score(ex), None);
    // Always pick the first option; some will be wrong.
    play(&mut b, ex, |snap| snap.options[0].clone());
    let score = b.unsaved_score(ex).expect("finished run");
    assert_eq!(score, b.snapshot(ex).percentage);

    b.mark_saved(ex);
    assert_eq!(b.unsaved_score(ex), None);
    b.reset(ex);
    let snap = b.snapshot(ex);
    assert_eq!((snap.step, snap.correct, snap.complete), (0, 0, false));
    assert_eq!(b.unsaved_score(ex), None);
  }

  #[test]
  fn exercise_names_are_kebab_case() {
    let ex: Exercise = serde_json::from_str("\"alphabet-caterpillar\"").unwrap();
    assert_eq!(ex, Exercise::AlphabetCaterpillar);
    assert_eq!(ex.game().score_name(), "alphabetCaterpillar");
  }
}
