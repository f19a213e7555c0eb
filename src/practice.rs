//! Quiz run and flashcard deck over the installed content.

use serde::Serialize;

use crate::domain::{Flashcard, QuestionRecord};

/// Result of answering the current quiz question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
  pub correct: bool,
  pub correct_index: usize,
  pub score: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
  pub current: usize,
  pub total: usize,
  pub question: Option<QuestionRecord>,
  pub selected: Option<usize>,
  pub score: u32,
  pub complete: bool,
}

#[derive(Clone, Debug, Default)]
pub struct QuizRun {
  questions: Vec<QuestionRecord>,
  current: usize,
  selected: Option<usize>,
  score: u32,
  complete: bool,
}

impl QuizRun {
  pub fn new(questions: Vec<QuestionRecord>) -> Self {
    Self { questions, ..Self::default() }
  }

  /// One answer per question; later answers are ignored.
  pub fn answer(&mut self, index: usize) -> Option<AnswerResult> {
    if self.complete || self.selected.is_some() {
      return None;
    }
    let q = self.questions.get(self.current)?;
    if index >= q.options.len() {
      return None;
    }
    let correct = index == q.correct_index;
    if correct {
      self.score += 1;
    }
    self.selected = Some(index);
    if self.current + 1 == self.questions.len() {
      self.complete = true;
    }
    Some(AnswerResult { correct, correct_index: q.correct_index, score: self.score })
  }

  /// Move on once the current question is answered.
  pub fn next(&mut self) -> bool {
    if self.selected.is_none() || self.current + 1 >= self.questions.len() {
      return false;
    }
    self.current += 1;
    self.selected = None;
    true
  }

  pub fn restart(&mut self) {
    self.current = 0;
    self.selected = None;
    self.score = 0;
    self.complete = false;
  }

  pub fn snapshot(&self) -> QuizSnapshot {
    QuizSnapshot {
      current: self.current,
      total: self.questions.len(),
      question: self.questions.get(self.current).cloned(),
      selected: self.selected,
      score: self.score,
      complete: self.complete,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSnapshot {
  pub index: usize,
  pub total: usize,
  pub card: Option<Flashcard>,
  pub flipped: bool,
}

#[derive(Clone, Debug, Default)]
pub struct FlashcardDeck {
  cards: Vec<Flashcard>,
  index: usize,
  flipped: bool,
}

impl FlashcardDeck {
  pub fn new(cards: Vec<Flashcard>) -> Self {
    Self { cards, index: 0, flipped: false }
  }

  pub fn next(&mut self) {
    if !self.cards.is_empty() {
      self.index = (self.index + 1) % self.cards.len();
      self.flipped = false;
    }
  }

  pub fn previous(&mut self) {
    if !self.cards.is_empty() {
      self.index = (self.index + self.cards.len() - 1) % self.cards.len();
      self.flipped = false;
    }
  }

  pub fn flip(&mut self) {
    if !self.cards.is_empty() {
      self.flipped = !self.flipped;
    }
  }

  pub fn snapshot(&self) -> FlashcardSnapshot {
    FlashcardSnapshot {
      index: self.index,
      total: self.cards.len(),
      card: self.cards.get(self.index).cloned(),
      flipped: self.flipped,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn questions() -> Vec<QuestionRecord> {
    (0..4)
      .map(|i| QuestionRecord {
        question: format!("Q{i}"),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        correct_index: i,
      })
      .collect()
  }

  fn cards() -> Vec<Flashcard> {
    (0..3).map(|i| Flashcard { front: format!("f{i}"), back: format!("b{i}") }).collect()
  }

  #[test]
  fn quiz_scores_each_question_once() {
    let mut quiz = QuizRun::new(questions());
    assert!(!quiz.next());
    assert_eq!(quiz.answer(0), Some(AnswerResult { correct: true, correct_index: 0, score: 1 }));
    assert_eq!(quiz.answer(0), None);
    assert!(quiz.next());
    assert_eq!(quiz.answer(0).map(|r| r.correct), Some(false));
    assert!(quiz.next());
    quiz.answer(2);
    assert!(quiz.next());
    assert!(!quiz.snapshot().complete);
    quiz.answer(3);
    let snap = quiz.snapshot();
    assert!(snap.complete);
    assert_eq!(snap.score, 3);
    assert!(!quiz.next());
  }

  #[test]
  fn quiz_rejects_bad_index_and_restarts() {
    let mut quiz = QuizRun::new(questions());
    assert_eq!(quiz.answer(4), None);
    quiz.answer(0);
    quiz.restart();
    let snap = quiz.snapshot();
    assert_eq!((snap.current, snap.score, snap.selected, snap.complete), (0, 0, None, false));
  }

  #[test]
  fn empty_quiz_is_inert() {
    let mut quiz = QuizRun::default();
    assert_eq!(quiz.answer(0), None);
    assert!(quiz.snapshot().question.is_none());
  }

  #[test]
  fn deck_wraps_and_clears_flip() {
    let mut deck = FlashcardDeck::new(cards());
    deck.flip();
    assert!(deck.snapshot().flipped);
    deck.previous();
    let snap = deck.snapshot();
    assert_eq!(snap.index, 2);
    assert!(!snap.flipped);
    deck.next();
    deck.next();
    assert_eq!(deck.snapshot().card.map(|c| c.front), Some("f1".to_string()));
  }

  #[test]
  fn empty_deck_does_nothing() {
    let mut deck = FlashcardDeck::default();
    deck.next();
    deck.previous();
    deck.flip();
    let snap = deck.snapshot();
    assert_eq!((snap.index, snap.flipped), (0, false));
  }
}
