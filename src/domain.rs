//! Domain models: generated questions, the validated canonical result, derived content,
//! views and attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fixed size of a generated question set. Cardinality is exact, not a minimum.
pub const QUESTION_COUNT: usize = 4;
/// Every question carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

/// One multiple-choice question as produced by the generation service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
  pub question: String,
  pub options: Vec<String>,
  pub correct_index: usize,
}

impl QuestionRecord {
  /// The option text at `correct_index`. Only call on validated records.
  pub fn correct_option(&self) -> &str {
    &self.options[self.correct_index]
  }
}

/// Exactly four well-formed questions. Only constructible through [`CanonicalResult::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CanonicalResult(Vec<QuestionRecord>);

impl CanonicalResult {
  pub fn new(questions: Vec<QuestionRecord>) -> Result<Self, ValidationError> {
    if questions.len() != QUESTION_COUNT {
      return Err(ValidationError::WrongItemCount { count: questions.len(), expected: QUESTION_COUNT });
    }
    for (item, q) in questions.iter().enumerate() {
      if q.question.trim().is_empty() {
        return Err(ValidationError::MissingQuestion { item });
      }
      if q.options.len() != OPTION_COUNT {
        return Err(ValidationError::WrongOptionCount { item, count: q.options.len(), expected: OPTION_COUNT });
      }
      if q.correct_index >= OPTION_COUNT {
        return Err(ValidationError::CorrectIndexOutOfRange {
          item,
          index: q.correct_index as i64,
          options: OPTION_COUNT,
        });
      }
    }
    Ok(Self(questions))
  }

  pub fn questions(&self) -> &[QuestionRecord] {
    &self.0
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
  pub front: String,
  pub back: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPair {
  pub term: String,
  pub definition: String,
}

/// The three projections of one canonical result. Fields are private so the arrays
/// can only ever be produced together by `derive::derive`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DerivedContent {
  pub(crate) quiz: Vec<QuestionRecord>,
  pub(crate) flashcards: Vec<Flashcard>,
  pub(crate) matching: Vec<MatchingPair>,
}

impl DerivedContent {
  pub fn quiz(&self) -> &[QuestionRecord] {
    &self.quiz
  }
  pub fn flashcards(&self) -> &[Flashcard] {
    &self.flashcards
  }
  pub fn matching(&self) -> &[MatchingPair] {
    &self.matching
  }
  pub fn is_empty(&self) -> bool {
    self.quiz.is_empty()
  }
}

/// Which screen the learner is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
  #[default]
  Upload,
  Quiz,
  Flashcards,
  Matching,
}

/// Practice games that keep durable per-learner scores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameKind {
  LetterMatching,
  AlphabetCaterpillar,
  FirstLetterPictures,
  PictureWordMatch,
}

impl GameKind {
  /// Storage key prefix for the attempt list.
  pub fn key(&self) -> &'static str {
    match self {
      GameKind::LetterMatching => "letter_matching",
      GameKind::AlphabetCaterpillar => "alphabet_caterpillar",
      GameKind::FirstLetterPictures => "first_letter_pictures",
      GameKind::PictureWordMatch => "picture_word_match",
    }
  }

  /// Key in the learner's score map.
  pub fn score_name(&self) -> &'static str {
    match self {
      GameKind::LetterMatching => "letterMatching",
      GameKind::AlphabetCaterpillar => "alphabetCaterpillar",
      GameKind::FirstLetterPictures => "firstLetterPictures",
      GameKind::PictureWordMatch => "pictureWordMatch",
    }
  }
}

/// One finished pass through the alphabet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
  pub attempt_number: u32,
  pub score: u32,
  pub total_letters: u32,
  pub percentage: u32,
  pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
  pub fn new(attempt_number: u32, score: u32, total_letters: u32, timestamp: DateTime<Utc>) -> Self {
    Self {
      attempt_number,
      score,
      total_letters,
      percentage: percentage(score, total_letters),
      timestamp,
    }
  }
}

/// `round(score / total * 100)`, rounding halves up. Zero total yields zero.
pub fn percentage(score: u32, total: u32) -> u32 {
  if total == 0 {
    return 0;
  }
  ((score as f64 / total as f64) * 100.0).round() as u32
}
