//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Running a generation for a session and installing its content
//!   - Driving the matching game, including its delayed resolutions
//!   - Quiz and flashcard navigation
//!   - Letter matching with durable attempt history
//!   - Alphabet exercises and their best scores

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{GameKind, View};
use crate::encoder::GenerationRequest;
use crate::error::{ApiError, ApiResult, GenerationError};
use crate::exercises::{Exercise, ExerciseBoard, ExerciseOutcome, ExerciseSnapshot};
use crate::letters::{LetterGame, LetterOutcome, LetterSnapshot};
use crate::matching::{FlipOutcome, MatchingSnapshot};
use crate::pipeline;
use crate::practice::{AnswerResult, FlashcardSnapshot, QuizSnapshot};
use crate::protocol::{
  ExerciseAnswerOut, FileData, HistoryOut, RecordedOut, ResolveLetterOut, ServerWsMessage, SessionOut,
};
use crate::state::{AppState, LearnerSession};

pub async fn find_session(state: &AppState, id: &str) -> ApiResult<Arc<LearnerSession>> {
  state.session(id).await.ok_or_else(|| ApiError::NotFound(format!("session {id}")))
}

/// Decode the upload, stream a question set for it and install the result.
/// Waits for the outcome; a newer submission makes this one return `Superseded`.
#[instrument(level = "info", skip(state, session, files), fields(session = %session.id, files = files.len()))]
pub async fn generate(state: &Arc<AppState>, session: &Arc<LearnerSession>, files: &[FileData]) -> ApiResult<SessionOut> {
  let request = GenerationRequest::from_upload(files, &state.config.limits)?;

  let generation = session.pipeline.begin();
  session.publish_status();
  info!(target: "generation", session = %session.id, generation, name = %request.name(), bytes = request.byte_len(), "Generation started");

  let task = tokio::spawn(run_generation(state.clone(), session.clone(), generation, request));
  session.pipeline.attach(generation, task.abort_handle());

  match task.await {
    Ok(Ok(())) => Ok(session.snapshot().await),
    Ok(Err(e)) => Err(e.into()),
    Err(join) if join.is_cancelled() => Err(session.pipeline.cancellation(generation).into()),
    Err(join) => {
      error!(target: "generation", session = %session.id, generation, error = %join, "Generation task panicked");
      Err(GenerationError::Aborted.into())
    }
  }
}

async fn run_generation(
  state: Arc<AppState>,
  session: Arc<LearnerSession>,
  generation: u64,
  request: GenerationRequest,
) -> Result<(), GenerationError> {
  let progress_session = session.clone();
  let result = pipeline::generate(
    state.generator.as_ref(),
    &state.config.prompts,
    &request,
    state.config.limits.generation_timeout(),
    move |progress, snapshot| progress_session.on_progress(generation, progress, snapshot),
  )
  .await;

  match result {
    Ok(content) => {
      if !session.commit(generation, content).await {
        return Err(GenerationError::Superseded);
      }
      session.pipeline.finish(generation, Ok(()));
      info!(target: "generation", session = %session.id, generation, "Content installed");
      session.publish_status();
      session.publish(ServerWsMessage::Session { session: session.snapshot().await });
      Ok(())
    }
    Err(e) => {
      warn!(target: "generation", session = %session.id, generation, error = %e, "Generation failed");
      if session.pipeline.finish(generation, Err(&e)) {
        session.publish_status();
      }
      Err(e)
    }
  }
}

pub fn abort_generation(session: &LearnerSession) -> Option<u64> {
  let aborted = session.pipeline.abort();
  if aborted.is_some() {
    session.publish_status();
  }
  aborted
}

pub async fn set_view(session: &LearnerSession, view: View) -> SessionOut {
  session.set_view(view).await;
  let snapshot = session.snapshot().await;
  session.publish(ServerWsMessage::Session { session: snapshot.clone() });
  snapshot
}

pub async fn clear_content(session: &LearnerSession) -> SessionOut {
  session.clear().await;
  let snapshot = session.snapshot().await;
  session.publish(ServerWsMessage::Session { session: snapshot.clone() });
  snapshot
}

/// Flip a card. When two are up, the resolution runs on a timer and its result
/// is pushed to subscribers.
#[instrument(level = "debug", skip(session), fields(session = %session.id))]
pub async fn flip_card(session: &Arc<LearnerSession>, card_id: usize) -> MatchingSnapshot {
  let mut game = session.matching.lock().await;
  if let FlipOutcome::Resolving(pending) = game.flip(card_id) {
    let timer_session = session.clone();
    tokio::spawn(async move {
      tokio::time::sleep(pending.delay).await;
      let snapshot = {
        let mut game = timer_session.matching.lock().await;
        if !game.apply(&pending) {
          return;
        }
        game.snapshot()
      };
      if snapshot.phase == crate::matching::MatchPhase::Complete {
        info!(target: "games", session = %timer_session.id, moves = snapshot.moves, "Matching game complete");
      }
      timer_session.publish(ServerWsMessage::Matching { matching: snapshot });
    });
  }
  let snapshot = game.snapshot();
  drop(game);
  session.publish(ServerWsMessage::Matching { matching: snapshot.clone() });
  snapshot
}

pub async fn reset_matching(session: &LearnerSession) -> MatchingSnapshot {
  let snapshot = {
    let mut game = session.matching.lock().await;
    game.reset();
    game.snapshot()
  };
  session.publish(ServerWsMessage::Matching { matching: snapshot.clone() });
  snapshot
}

pub async fn matching_snapshot(session: &LearnerSession) -> MatchingSnapshot {
  session.matching.lock().await.snapshot()
}

pub async fn answer_question(session: &LearnerSession, index: usize) -> (Option<AnswerResult>, QuizSnapshot) {
  let mut quiz = session.quiz.lock().await;
  let result = quiz.answer(index);
  if result.is_none() {
    debug!(target: "games", session = %session.id, index, "Answer ignored");
  }
  (result, quiz.snapshot())
}

pub async fn next_question(session: &LearnerSession) -> QuizSnapshot {
  let mut quiz = session.quiz.lock().await;
  quiz.next();
  quiz.snapshot()
}

pub async fn restart_quiz(session: &LearnerSession) -> QuizSnapshot {
  let mut quiz = session.quiz.lock().await;
  quiz.restart();
  quiz.snapshot()
}

#[derive(Clone, Copy, Debug)]
pub enum CardMove {
  Next,
  Previous,
  Flip,
}

pub async fn move_flashcard(session: &LearnerSession, mv: CardMove) -> FlashcardSnapshot {
  let mut deck = session.flashcards.lock().await;
  match mv {
    CardMove::Next => deck.next(),
    CardMove::Previous => deck.previous(),
    CardMove::Flip => deck.flip(),
  }
  deck.snapshot()
}

pub async fn letters_snapshot(session: &LearnerSession) -> LetterSnapshot {
  session.letters.lock().await.snapshot()
}

/// Store a finished letter attempt that has not been stored yet.
fn store_letter_attempt(state: &AppState, learner: &str, game: &mut LetterGame) -> ApiResult<Option<RecordedOut>> {
  let Some(record) = game.pending_record().cloned() else {
    return Ok(None);
  };
  let recorded = state.history.record(GameKind::LetterMatching, learner, record)?;
  game.mark_recorded();
  Ok(Some(RecordedOut { record: recorded.record, best: recorded.best }))
}

/// Resolve one letter. Finishing the alphabet appends the attempt to the learner's
/// history; if that write fails, the next resolve or reset tries again.
#[instrument(level = "debug", skip(state, session), fields(session = %session.id))]
pub async fn resolve_letter(state: &AppState, session: &LearnerSession, upper: char, lower: char) -> ApiResult<ResolveLetterOut> {
  let mut game = session.letters.lock().await;
  let correct = match game.resolve(upper, lower) {
    LetterOutcome::Ignored => None,
    LetterOutcome::Resolved { correct } | LetterOutcome::Completed { correct } => Some(correct),
  };
  let recorded = store_letter_attempt(state, &session.learner_id, &mut game)?;
  let letters = game.snapshot();
  drop(game);

  let out = ResolveLetterOut { correct, letters, recorded };
  if out.correct.is_some() || out.recorded.is_some() {
    session.publish(ServerWsMessage::LetterResult {
      correct: out.correct,
      letters: out.letters.clone(),
      recorded: out.recorded.clone(),
    });
  }
  Ok(out)
}

pub async fn reset_letters(state: &AppState, session: &LearnerSession) -> ApiResult<LetterSnapshot> {
  let mut game = session.letters.lock().await;
  store_letter_attempt(state, &session.learner_id, &mut game)?;
  let prior = state.history.attempts(GameKind::LetterMatching, &session.learner_id)?.len();
  game.reset(prior);
  Ok(game.snapshot())
}

pub fn letter_history(state: &AppState, session: &LearnerSession) -> ApiResult<HistoryOut> {
  let game = GameKind::LetterMatching;
  Ok(HistoryOut {
    learner_id: session.learner_id.clone(),
    attempts: state.history.attempts(game, &session.learner_id)?,
    best: state.history.best(game, &session.learner_id)?,
    scores: state.history.scores(&session.learner_id)?,
  })
}

pub async fn exercise_snapshot(session: &LearnerSession, exercise: Exercise) -> ExerciseSnapshot {
  session.exercises.lock().await.snapshot(exercise)
}

/// Store the best score of a finished exercise run that has not been stored yet.
fn store_exercise_score(state: &AppState, learner: &str, board: &mut ExerciseBoard, exercise: Exercise) -> ApiResult<Option<u32>> {
  let Some(percentage) = board.unsaved_score(exercise) else {
    return Ok(None);
  };
  let best = state.history.record_best(exercise.game(), learner, percentage)?;
  board.mark_saved(exercise);
  Ok(Some(best))
}

/// Answer the current step of an exercise. A finished run raises the learner's best.
#[instrument(level = "debug", skip(state, session), fields(session = %session.id))]
pub async fn answer_exercise(
  state: &AppState,
  session: &LearnerSession,
  exercise: Exercise,
  choice: &str,
) -> ApiResult<ExerciseAnswerOut> {
  let mut board = session.exercises.lock().await;
  let (correct, expected) = match board.answer(exercise, choice) {
    ExerciseOutcome::Ignored => (None, None),
    ExerciseOutcome::Answered { correct, expected } | ExerciseOutcome::Completed { correct, expected, .. } => {
      (Some(correct), Some(expected))
    }
  };
  let best = store_exercise_score(state, &session.learner_id, &mut board, exercise)?;
  let out = ExerciseAnswerOut { correct, expected, best, exercise: board.snapshot(exercise) };
  drop(board);

  if let Some(best) = out.best {
    info!(target: "games", session = %session.id, ?exercise, percentage = out.exercise.percentage, best, "Exercise finished");
  }
  if out.correct.is_some() || out.best.is_some() {
    session.publish(ServerWsMessage::ExerciseResult { result: out.clone() });
  }
  Ok(out)
}

pub async fn reset_exercise(state: &AppState, session: &LearnerSession, exercise: Exercise) -> ApiResult<ExerciseSnapshot> {
  let mut board = session.exercises.lock().await;
  store_exercise_score(state, &session.learner_id, &mut board, exercise)?;
  board.reset(exercise);
  Ok(board.snapshot(exercise))
}

/// Forget a session. In-flight generation is aborted and connected sockets are told.
#[instrument(level = "info", skip(state))]
pub async fn close_session(state: &AppState, id: &str) -> ApiResult<()> {
  let session = state.remove_session(id).await.ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
  session.close();
  Ok(())
}
