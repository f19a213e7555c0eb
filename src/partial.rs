//! Reading a question list out of a JSON document that is still arriving.
//!
//! The accumulated text is cut back to the last point where a value was fully
//! received, the open containers are closed, and the result is parsed. Strings
//! and numbers therefore only ever appear once they are complete, so successive
//! snapshots of a growing text only ever grow.

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;

/// One question as far as it has been received.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialQuestion {
  pub question: Option<String>,
  pub options: Vec<String>,
  pub correct_index: Option<i64>,
  /// The question's object has been closed; nothing more will arrive for it.
  #[serde(skip)]
  pub closed: bool,
}

impl PartialQuestion {
  fn absorb(&mut self, newer: PartialQuestion) {
    if newer.question.is_some() {
      self.question = newer.question;
    }
    if newer.options.len() >= self.options.len() {
      self.options = newer.options;
    }
    if newer.correct_index.is_some() {
      self.correct_index = newer.correct_index;
    }
    self.closed |= newer.closed;
  }
}

/// Snapshot of the question list at some point in the stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PartialResult {
  pub items: Vec<PartialQuestion>,
  /// The list itself has been closed.
  #[serde(skip)]
  pub list_closed: bool,
}

impl PartialResult {
  /// Fold a newer snapshot in. Items already received are never retracted.
  pub fn merge(&mut self, newer: PartialResult) {
    for (i, item) in newer.items.into_iter().enumerate() {
      match self.items.get_mut(i) {
        Some(existing) => existing.absorb(item),
        None => self.items.push(item),
      }
    }
    self.list_closed |= newer.list_closed;
  }
}

/// Accumulates streamed text and keeps the merged snapshot current.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
  text: String,
  snapshot: PartialResult,
}

impl StreamAccumulator {
  pub fn push(&mut self, delta: &str) -> Result<&PartialResult, ValidationError> {
    self.text.push_str(delta);
    let newer = read_partial(&self.text)?;
    self.snapshot.merge(newer);
    Ok(&self.snapshot)
  }

  pub fn snapshot(&self) -> &PartialResult {
    &self.snapshot
  }

  pub fn into_snapshot(self) -> PartialResult {
    self.snapshot
  }

  pub fn text_len(&self) -> usize {
    self.text.len()
  }
}

/// Parse whatever is complete so far. Accepts `{"questions": [...]}` or a bare array,
/// optionally wrapped in a markdown code fence.
pub fn read_partial(text: &str) -> Result<PartialResult, ValidationError> {
  let Some(repaired) = repair(text) else {
    return Ok(PartialResult::default());
  };
  let root: Value = serde_json::from_str(&repaired.json)
    .map_err(|e| ValidationError::NotAQuestionList(format!("invalid JSON: {e}")))?;

  let (items, list_depth) = match &root {
    Value::Array(items) => (items, 1),
    Value::Object(map) => match map.get("questions") {
      Some(Value::Array(items)) => (items, 2),
      Some(other) => {
        return Err(ValidationError::NotAQuestionList(format!("'questions' is {}", kind_name(other))));
      }
      None if repaired.open_depth == 0 && !map.is_empty() => {
        return Err(ValidationError::NotAQuestionList("missing 'questions' field".into()));
      }
      None => return Ok(PartialResult::default()),
    },
    other => return Err(ValidationError::NotAQuestionList(format!("top level is {}", kind_name(other)))),
  };

  let last_open = repaired.open_depth > list_depth;
  let list_closed = repaired.open_depth < list_depth;
  let last = items.len().saturating_sub(1);

  let items = items
    .iter()
    .enumerate()
    .map(|(i, v)| read_item(i, v, !(last_open && i == last)))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(PartialResult { items, list_closed })
}

fn read_item(index: usize, value: &Value, closed: bool) -> Result<PartialQuestion, ValidationError> {
  let Value::Object(map) = value else {
    return Err(ValidationError::NotAQuestionList(format!("question {index} is {}", kind_name(value))));
  };

  let question = match map.get("question") {
    None => None,
    Some(Value::String(s)) => Some(s.clone()),
    Some(other) => {
      return Err(ValidationError::NotAQuestionList(format!(
        "question {index}: 'question' is {}",
        kind_name(other)
      )));
    }
  };

  let options = match map.get("options") {
    None => Vec::new(),
    Some(Value::Array(opts)) => opts
      .iter()
      .map(|o| match o {
        Value::String(s) => Ok(s.clone()),
        other => Err(ValidationError::NotAQuestionList(format!(
          "question {index}: option is {}",
          kind_name(other)
        ))),
      })
      .collect::<Result<Vec<_>, _>>()?,
    Some(other) => {
      return Err(ValidationError::NotAQuestionList(format!(
        "question {index}: 'options' is {}",
        kind_name(other)
      )));
    }
  };

  let correct_index = match map.get("correctIndex") {
    None => None,
    Some(Value::Number(n)) => match n.as_i64() {
      Some(i) => Some(i),
      None => {
        return Err(ValidationError::NotAQuestionList(format!(
          "question {index}: correctIndex {n} is not an integer"
        )));
      }
    },
    Some(other) => {
      return Err(ValidationError::NotAQuestionList(format!(
        "question {index}: 'correctIndex' is {}",
        kind_name(other)
      )));
    }
  };

  Ok(PartialQuestion { question, options, correct_index, closed })
}

fn kind_name(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
  Object,
  Array,
}

struct Frame {
  kind: Container,
  expect_key: bool,
}

struct SafePoint {
  end: usize,
  open: Vec<Container>,
}

struct Repaired {
  json: String,
  open_depth: usize,
}

fn safe_point(stack: &[Frame], end: usize) -> SafePoint {
  SafePoint { end, open: stack.iter().map(|f| f.kind).collect() }
}

/// Cut `text` back to the last complete value and close whatever is still open.
/// Returns `None` when no container has started yet.
fn repair(text: &str) -> Option<Repaired> {
  let start = text.find(|c: char| c == '{' || c == '[')?;
  let bytes = text.as_bytes();

  let mut stack: Vec<Frame> = Vec::new();
  let mut safe: Option<SafePoint> = None;
  let mut in_string = false;
  let mut escaped = false;
  let mut in_scalar = false;

  for i in start..bytes.len() {
    let b = bytes[i];

    if in_string {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_string = false;
        let is_key = matches!(stack.last(), Some(Frame { kind: Container::Object, expect_key: true }));
        if !is_key {
          safe = Some(safe_point(&stack, i + 1));
        }
      }
      continue;
    }

    if in_scalar {
      if matches!(b, b',' | b'}' | b']' | b' ' | b'\n' | b'\r' | b'\t') {
        in_scalar = false;
        safe = Some(safe_point(&stack, i));
      } else {
        continue;
      }
    }

    match b {
      b'"' => in_string = true,
      b'{' => {
        stack.push(Frame { kind: Container::Object, expect_key: true });
        safe = Some(safe_point(&stack, i + 1));
      }
      b'[' => {
        stack.push(Frame { kind: Container::Array, expect_key: false });
        safe = Some(safe_point(&stack, i + 1));
      }
      b'}' | b']' => {
        stack.pop();
        safe = Some(safe_point(&stack, i + 1));
        if stack.is_empty() {
          break;
        }
      }
      b':' => {
        if let Some(f) = stack.last_mut() {
          f.expect_key = false;
        }
      }
      b',' => {
        if let Some(f) = stack.last_mut() {
          if f.kind == Container::Object {
            f.expect_key = true;
          }
        }
      }
      b' ' | b'\n' | b'\r' | b'\t' => {}
      _ => in_scalar = true,
    }
  }

  let safe = safe?;
  let mut json = String::with_capacity(safe.end - start + safe.open.len());
  json.push_str(&text[start..safe.end]);
  for kind in safe.open.iter().rev() {
    json.push(match kind {
      Container::Object => '}',
      Container::Array => ']',
    });
  }
  Some(Repaired { json, open_depth: safe.open.len() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  const FULL: &str = r#"{"questions":[{"question":"What is 2+2?","options":["3","4","5","6"],"correctIndex":1},{"question":"Capital of France?","options":["Paris","Rome","Oslo","Bern"],"correctIndex":0}]}"#;

  #[test]
  fn nothing_before_first_container() {
    assert_eq!(read_partial("").unwrap(), PartialResult::default());
    assert_eq!(read_partial("```json\n").unwrap(), PartialResult::default());
    assert_eq!(read_partial("{\"questi").unwrap(), PartialResult::default());
  }

  #[test]
  fn half_written_strings_are_hidden() {
    let r = read_partial(r#"{"questions":[{"question":"What is 2"#).unwrap();
    assert_eq!(r.items.len(), 1);
    assert_eq!(r.items[0].question, None);
    assert!(!r.items[0].closed);

    let r = read_partial(r#"{"questions":[{"question":"What is 2+2?","options":["3","4"#).unwrap();
    assert_eq!(r.items[0].question.as_deref(), Some("What is 2+2?"));
    assert_eq!(r.items[0].options, vec!["3".to_string()]);
  }

  #[test]
  fn trailing_number_waits_for_delimiter() {
    let r = read_partial(r#"[{"question":"Q","options":["a","b","c","d"],"correctIndex":1"#).unwrap();
    assert_eq!(r.items[0].correct_index, None);
    let r = read_partial(r#"[{"question":"Q","options":["a","b","c","d"],"correctIndex":1}"#).unwrap();
    assert_eq!(r.items[0].correct_index, Some(1));
    assert!(r.items[0].closed);
    assert!(!r.list_closed);
  }

  #[test]
  fn every_prefix_parses_and_grows() {
    let mut previous = 0usize;
    for end in 0..=FULL.len() {
      let r = read_partial(&FULL[..end]).unwrap_or_else(|e| panic!("prefix {end} failed: {e}"));
      let filled: usize = r
        .items
        .iter()
        .map(|q| q.options.len() + q.question.is_some() as usize + q.correct_index.is_some() as usize)
        .sum();
      assert!(filled >= previous, "snapshot shrank at prefix {end}");
      previous = filled;
    }
    let done = read_partial(FULL).unwrap();
    assert_eq!(done.items.len(), 2);
    assert!(done.list_closed);
    assert!(done.items.iter().all(|q| q.closed));
  }

  #[test]
  fn escaped_quotes_do_not_end_strings() {
    let r = read_partial(r#"[{"question":"Who said \"hi\"?","options":["a\\","b"#).unwrap();
    assert_eq!(r.items[0].question.as_deref(), Some("Who said \"hi\"?"));
    assert_eq!(r.items[0].options, vec!["a\\".to_string()]);
  }

  #[test]
  fn code_fences_are_ignored() {
    let fenced = format!("```json\n{FULL}\n```");
    let r = read_partial(&fenced).unwrap();
    assert_eq!(r.items.len(), 2);
    assert!(r.list_closed);
  }

  #[test]
  fn wrong_shapes_are_rejected() {
    assert!(matches!(read_partial(r#"{"questions":"nope"}"#), Err(ValidationError::NotAQuestionList(_))));
    assert!(matches!(read_partial(r#"{"items":[]}"#), Err(ValidationError::NotAQuestionList(_))));
    assert!(matches!(read_partial(r#"[{"question":"Q","options":[1,2]}]"#), Err(ValidationError::NotAQuestionList(_))));
    assert!(matches!(read_partial(r#"[{"question":"Q","correctIndex":1.5}]"#), Err(ValidationError::NotAQuestionList(_))));
    assert!(matches!(read_partial(r#"[{"question":nope}]"#), Err(ValidationError::NotAQuestionList(_))));
  }

  #[test]
  fn accumulator_merges_chunks() {
    let mut acc = StreamAccumulator::default();
    for chunk in FULL.as_bytes().chunks(7) {
      acc.push(std::str::from_utf8(chunk).unwrap()).unwrap();
    }
    assert_eq!(acc.snapshot(), &read_partial(FULL).unwrap());
    assert_eq!(acc.text_len(), FULL.len());
  }
}
