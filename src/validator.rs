//! Structural checks on streamed question sets.
//!
//! Mid-stream, missing pieces are fine; impossible ones are not. An item counts
//! as finished once its object has closed, and from then on it must be whole.

use crate::domain::{CanonicalResult, QuestionRecord, OPTION_COUNT, QUESTION_COUNT};
use crate::error::ValidationError;
use crate::partial::{PartialQuestion, PartialResult};

/// Check a mid-stream snapshot. Returns the number of finished, well-formed questions.
pub fn validate_increment(partial: &PartialResult) -> Result<usize, ValidationError> {
  if partial.items.len() > QUESTION_COUNT {
    return Err(ValidationError::WrongItemCount { count: partial.items.len(), expected: QUESTION_COUNT });
  }

  let mut finished = 0;
  for (item, q) in partial.items.iter().enumerate() {
    check_present_fields(item, q)?;
    if q.closed {
      check_finished(item, q)?;
      finished += 1;
    }
  }

  if partial.list_closed && partial.items.len() != QUESTION_COUNT {
    return Err(ValidationError::WrongItemCount { count: partial.items.len(), expected: QUESTION_COUNT });
  }
  Ok(finished)
}

/// Check the snapshot left when the stream ended and build the canonical result from it.
pub fn validate_final(partial: PartialResult) -> Result<CanonicalResult, ValidationError> {
  validate_increment(&partial)?;
  if partial.items.len() != QUESTION_COUNT {
    return Err(ValidationError::WrongItemCount { count: partial.items.len(), expected: QUESTION_COUNT });
  }
  if let Some(item) = partial.items.iter().position(|q| !q.closed) {
    return Err(ValidationError::Incomplete { item });
  }

  let records = partial
    .items
    .into_iter()
    .enumerate()
    .map(|(item, q)| {
      let index = q.correct_index.ok_or(ValidationError::MissingCorrectIndex { item })?;
      Ok(QuestionRecord {
        question: q.question.ok_or(ValidationError::MissingQuestion { item })?,
        options: q.options,
        correct_index: index as usize,
      })
    })
    .collect::<Result<Vec<_>, ValidationError>>()?;

  CanonicalResult::new(records)
}

/// Feedback-only completion estimate in percent.
pub fn progress(finished: usize) -> u8 {
  (finished.min(QUESTION_COUNT) * 100 / QUESTION_COUNT) as u8
}

fn check_present_fields(item: usize, q: &PartialQuestion) -> Result<(), ValidationError> {
  if let Some(index) = q.correct_index {
    if index < 0 || index as usize >= OPTION_COUNT {
      return Err(ValidationError::CorrectIndexOutOfRange { item, index, options: OPTION_COUNT });
    }
  }
  if q.options.len() > OPTION_COUNT {
    return Err(ValidationError::WrongOptionCount { item, count: q.options.len(), expected: OPTION_COUNT });
  }
  Ok(())
}

fn check_finished(item: usize, q: &PartialQuestion) -> Result<(), ValidationError> {
  match &q.question {
    Some(text) if !text.trim().is_empty() => {}
    _ => return Err(ValidationError::MissingQuestion { item }),
  }
  if q.options.len() != OPTION_COUNT {
    return Err(ValidationError::WrongOptionCount { item, count: q.options.len(), expected: OPTION_COUNT });
  }
  if q.correct_index.is_none() {
    return Err(ValidationError::MissingCorrectIndex { item });
  }
  Ok(())
}
