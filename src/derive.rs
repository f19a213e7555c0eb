//! Projection of a canonical question set into quiz, flashcards and matching pairs.

use crate::domain::{CanonicalResult, DerivedContent, Flashcard, MatchingPair};

/// Pure and total: every array has one entry per question, in question order.
pub fn derive(canonical: &CanonicalResult) -> DerivedContent {
  let questions = canonical.questions();
  let flashcards = questions
    .iter()
    .map(|q| Flashcard { front: q.question.clone(), back: q.correct_option().to_string() })
    .collect();
  let matching = questions
    .iter()
    .map(|q| MatchingPair { term: q.question.clone(), definition: q.correct_option().to_string() })
    .collect();

  DerivedContent { quiz: questions.to_vec(), flashcards, matching }
}
