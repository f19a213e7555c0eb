//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AttemptRecord, DerivedContent, View};
use crate::exercises::{Exercise, ExerciseSnapshot};
use crate::letters::LetterSnapshot;
use crate::matching::MatchingSnapshot;
use crate::pipeline::PipelineStatus;
use crate::practice::{AnswerResult, FlashcardSnapshot, QuizSnapshot};

/// One uploaded document: `data` is a base64 data URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileData {
  pub name: String,
  #[serde(rename = "type")]
  pub media_type: String,
  pub data: String,
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  GetSession,
  SetView { view: View },
  ClearContent,
  Generate { files: Vec<FileData> },
  AbortGeneration,
  GetMatching,
  FlipCard {
    #[serde(rename = "cardId")]
    card_id: usize,
  },
  ResetMatching,
  AnswerQuestion { index: usize },
  NextQuestion,
  RestartQuiz,
  NextFlashcard,
  PreviousFlashcard,
  FlipFlashcard,
  GetLetters,
  ResolveLetter { upper: char, lower: char },
  ResetLetters,
  LetterHistory,
  GetExercise { exercise: Exercise },
  AnswerExercise { exercise: Exercise, choice: String },
  ResetExercise { exercise: Exercise },
}

/// Messages the server sends back over WebSocket, as replies or pushed events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Session { session: SessionOut },
  Generation { status: PipelineStatus },
  Matching { matching: MatchingSnapshot },
  Quiz { quiz: QuizSnapshot },
  AnswerResult { result: AnswerResult, quiz: QuizSnapshot },
  Flashcards { flashcards: FlashcardSnapshot },
  Letters { letters: LetterSnapshot },
  LetterResult {
    correct: Option<bool>,
    letters: LetterSnapshot,
    recorded: Option<RecordedOut>,
  },
  History { history: HistoryOut },
  Exercise { exercise: ExerciseSnapshot },
  ExerciseResult { result: ExerciseAnswerOut },
  /// The session was deleted; the socket closes after this.
  SessionClosed { id: String },
  Error {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
  },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub generation_configured: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionIn {
  pub learner_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
  pub id: String,
  pub learner_id: String,
  pub active_view: View,
  pub available_views: Vec<View>,
  pub content: Option<DerivedContent>,
  pub revision: u64,
  pub generation: PipelineStatus,
}

#[derive(Debug, Deserialize)]
pub struct SetViewIn {
  pub view: View,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
  #[serde(default)]
  pub files: Vec<FileData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortOut {
  pub aborted: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipIn {
  pub card_id: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
  pub index: usize,
}

#[derive(Serialize)]
pub struct AnswerOut {
  pub result: Option<AnswerResult>,
  pub quiz: QuizSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ResolveLetterIn {
  pub upper: char,
  pub lower: char,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedOut {
  pub record: AttemptRecord,
  pub best: u32,
}

#[derive(Debug, Serialize)]
pub struct ResolveLetterOut {
  /// None when the letter was not in play.
  pub correct: Option<bool>,
  pub letters: LetterSnapshot,
  pub recorded: Option<RecordedOut>,
}

#[derive(Debug, Deserialize)]
pub struct ExerciseAnswerIn {
  pub choice: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExerciseAnswerOut {
  /// None when the pick was not valid for the current step.
  pub correct: Option<bool>,
  pub expected: Option<String>,
  /// Best score after a finished run was stored.
  pub best: Option<u32>,
  pub exercise: ExerciseSnapshot,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOut {
  pub learner_id: String,
  pub attempts: Vec<AttemptRecord>,
  pub best: Option<u32>,
  pub scores: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
  pub session_id: String,
}
