//! Turning a stream of generated text into validated, derived content.
//!
//! [`consume`] drains one stream: every delta is folded into the accumulator,
//! the merged snapshot is re-validated, and progress is reported when it moves.
//! [`GenerationPipeline`] tracks which submission is current for a session so
//! that a newer submission (or an explicit abort) cancels the older task and
//! stale results never reach the content store.

use std::{
  sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
  },
  time::Duration,
};

use futures::StreamExt;
use serde::Serialize;
use tokio::{sync::watch, task::AbortHandle};
use tracing::{debug, info, instrument, warn};

use crate::config::Prompts;
use crate::derive::derive;
use crate::domain::{CanonicalResult, DerivedContent};
use crate::encoder::GenerationRequest;
use crate::error::GenerationError;
use crate::openai::{DeltaStream, GenerationService};
use crate::partial::{PartialQuestion, PartialResult, StreamAccumulator};
use crate::validator::{progress, validate_final, validate_increment};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
  #[default]
  Idle,
  Streaming { generation: u64, progress: u8, items: Vec<PartialQuestion> },
  Completed { generation: u64 },
  Failed { generation: u64, message: String },
}

/// Drain `deltas` into a canonical result. `on_progress` sees every snapshot that
/// added an item or finished one.
pub async fn consume<F>(mut deltas: DeltaStream, mut on_progress: F) -> Result<CanonicalResult, GenerationError>
where
  F: FnMut(u8, &PartialResult) + Send,
{
  let mut acc = StreamAccumulator::default();
  let mut last = (0usize, 0usize);

  while let Some(delta) = deltas.next().await {
    let delta = delta?;
    let snapshot = acc.push(&delta)?;
    let finished = validate_increment(snapshot)?;
    let seen = (snapshot.items.len(), finished);
    if seen != last {
      last = seen;
      on_progress(progress(finished), snapshot);
    }
  }

  if acc.text_len() == 0 {
    return Err(GenerationError::EmptyStream);
  }
  debug!(target: "generation", bytes = acc.text_len(), "Stream finished");
  Ok(validate_final(acc.into_snapshot())?)
}

/// Open a stream for `request`, consume it within `limit` and derive the content.
#[instrument(level = "info", skip_all, fields(name = %request.name(), bytes = request.byte_len()))]
pub async fn generate<F>(
  service: &dyn GenerationService,
  prompts: &Prompts,
  request: &GenerationRequest,
  limit: Duration,
  on_progress: F,
) -> Result<DerivedContent, GenerationError>
where
  F: FnMut(u8, &PartialResult) + Send,
{
  let deltas = service.open(prompts, request);
  let canonical = tokio::time::timeout(limit, consume(deltas, on_progress))
    .await
    .map_err(|_| GenerationError::Timeout(limit.as_secs()))??;
  info!(target: "generation", "Question set validated");
  Ok(derive(&canonical))
}

/// Submission bookkeeping for one session.
pub struct GenerationPipeline {
  generation: AtomicU64,
  aborted: AtomicU64,
  inflight: Mutex<Option<AbortHandle>>,
  status: watch::Sender<PipelineStatus>,
}

impl Default for GenerationPipeline {
  fn default() -> Self {
    Self::new()
  }
}

impl GenerationPipeline {
  pub fn new() -> Self {
    let (status, _) = watch::channel(PipelineStatus::Idle);
    Self { generation: AtomicU64::new(0), aborted: AtomicU64::new(0), inflight: Mutex::new(None), status }
  }

  /// Start a new submission. Cancels whatever was in flight.
  pub fn begin(&self) -> u64 {
    let mut slot = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(previous) = slot.take() {
      previous.abort();
      info!(target: "generation", generation, "Superseded in-flight generation");
    }
    self.status.send_replace(PipelineStatus::Streaming { generation, progress: 0, items: Vec::new() });
    generation
  }

  /// Register the task running `generation`. A task that is already stale is cancelled.
  pub fn attach(&self, generation: u64, handle: AbortHandle) {
    let mut slot = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
    if self.is_current(generation) {
      *slot = Some(handle);
    } else {
      handle.abort();
    }
  }

  /// Cancel the in-flight task, if any. Returns its generation.
  pub fn abort(&self) -> Option<u64> {
    let mut slot = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
    let handle = slot.take()?;
    handle.abort();
    let generation = self.generation.fetch_add(1, Ordering::SeqCst);
    self.aborted.store(generation, Ordering::SeqCst);
    self.status.send_replace(PipelineStatus::Failed {
      generation,
      message: GenerationError::Aborted.to_string(),
    });
    warn!(target: "generation", generation, "Generation aborted");
    Some(generation)
  }

  pub fn is_current(&self, generation: u64) -> bool {
    self.generation.load(Ordering::SeqCst) == generation
  }

  /// Why the task for `generation` was cancelled.
  pub fn cancellation(&self, generation: u64) -> GenerationError {
    if self.aborted.load(Ordering::SeqCst) == generation {
      GenerationError::Aborted
    } else {
      GenerationError::Superseded
    }
  }

  pub fn report(&self, generation: u64, progress: u8, snapshot: &PartialResult) -> bool {
    if !self.is_current(generation) {
      return false;
    }
    self.status.send_replace(PipelineStatus::Streaming { generation, progress, items: snapshot.items.clone() });
    true
  }

  /// Record the outcome of `generation` if it is still current.
  pub fn finish(&self, generation: u64, outcome: Result<(), &GenerationError>) -> bool {
    let mut slot = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
    if !self.is_current(generation) {
      return false;
    }
    slot.take();
    let status = match outcome {
      Ok(()) => PipelineStatus::Completed { generation },
      Err(e) => PipelineStatus::Failed { generation, message: e.to_string() },
    };
    self.status.send_replace(status);
    true
  }

  pub fn status(&self) -> PipelineStatus {
    self.status.borrow().clone()
  }
}


#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;

  async fn run(service: &ScriptedService, limit: Duration) -> (Result<DerivedContent, GenerationError>, Vec<u8>) {
    let mut seen = Vec::new();
    let result = generate(service, &Prompts::default(), &request(), limit, |p, _| seen.push(p)).await;
    (result, seen)
  }

  #[tokio::test(start_paused = true)]
  async fn valid_stream_yields_derived_content() {
    let (result, seen) = run(&ScriptedService::valid(), Duration::from_secs(60)).await;
    let content = result.expect("content");
    assert_eq!(content.quiz().len(), 4);
    assert_eq!(content.flashcards()[1].back, "x1");
    assert_eq!(content.matching()[3].definition, "z3");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
  }

  #[tokio::test(start_paused = true)]
  async fn upstream_failure_is_terminal() {
    let (result, seen) = run(&ScriptedService::failing_midway(), Duration::from_secs(60)).await;
    assert!(matches!(result, Err(GenerationError::Upstream { status: 502, .. })));
    assert!(seen.iter().all(|p| *p < 100));
  }

  #[tokio::test(start_paused = true)]
  async fn schema_violation_stops_the_stream() {
    let text = r#"{"questions":[{"question":"Q","options":["a","b","c"],"correctIndex":1},"#;
    let mut steps = chunked(text, 9);
    steps.push(Step::Fail(500, "should never be reached".into()));
    let (result, _) = run(&ScriptedService::new(steps), Duration::from_secs(60)).await;
    assert!(matches!(
      result,
      Err(GenerationError::Schema(crate::error::ValidationError::WrongOptionCount { count: 3, .. }))
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn too_many_questions_fail() {
    let service = ScriptedService::new(chunked(&question_set_json(5), 40));
    let (result, _) = run(&service, Duration::from_secs(60)).await;
    assert!(matches!(result, Err(GenerationError::Schema(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn empty_and_truncated_streams_fail() {
    let (result, _) = run(&ScriptedService::new(Vec::new()), Duration::from_secs(60)).await;
    assert!(matches!(result, Err(GenerationError::EmptyStream)));

    let text = question_set_json(4);
    let truncated = ScriptedService::new(chunked(&text[..text.len() - 3], 50));
    let (result, _) = run(&truncated, Duration::from_secs(60)).await;
    assert!(matches!(result, Err(GenerationError::Schema(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn slow_stream_times_out() {
    let service = ScriptedService::valid().with_gap(Duration::from_secs(10));
    let (result, _) = run(&service, Duration::from_secs(30)).await;
    assert!(matches!(result, Err(GenerationError::Timeout(30))));
  }

  #[tokio::test(start_paused = true)]
  async fn new_submission_cancels_the_old_task() {
    let pipeline = GenerationPipeline::new();
    let first = pipeline.begin();
    let task = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await });
    pipeline.attach(first, task.abort_handle());

    let second = pipeline.begin();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(!pipeline.is_current(first));
    assert!(matches!(pipeline.cancellation(first), GenerationError::Superseded));
    assert!(!pipeline.finish(first, Ok(())));
    assert!(pipeline.finish(second, Ok(())));
    assert_eq!(pipeline.status(), PipelineStatus::Completed { generation: second });
  }

  #[tokio::test(start_paused = true)]
  async fn late_attach_of_stale_task_cancels_it() {
    let pipeline = GenerationPipeline::new();
    let first = pipeline.begin();
    let _second = pipeline.begin();
    let task = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await });
    pipeline.attach(first, task.abort_handle());
    assert!(task.await.unwrap_err().is_cancelled());
  }

  #[tokio::test(start_paused = true)]
  async fn abort_marks_failure() {
    let pipeline = GenerationPipeline::new();
    assert_eq!(pipeline.abort(), None);
    let generation = pipeline.begin();
    let task = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await });
    pipeline.attach(generation, task.abort_handle());

    assert_eq!(pipeline.abort(), Some(generation));
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(matches!(pipeline.cancellation(generation), GenerationError::Aborted));
    assert!(matches!(pipeline.status(), PipelineStatus::Failed { generation: g, .. } if g == generation));
    assert!(!pipeline.report(generation, 50, &PartialResult::default()));
  }
}
