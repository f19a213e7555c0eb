//! Error taxonomy for the generation pipeline, the durable store and the HTTP surface.
//!
//! Game engines have no error type: invalid moves are no-ops.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

/// Problems with the uploaded document itself. Surfaced immediately, no state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
  #[error("No files provided")]
  NoFiles,

  #[error("Document is empty")]
  Empty,

  #[error("Document is too large: {size} bytes (max {max})")]
  TooLarge { size: usize, max: usize },

  #[error("Unsupported document type '{found}' (expected {expected})")]
  UnsupportedType { found: String, expected: String },

  #[error("Invalid file data: {0}")]
  Malformed(String),
}

/// Structural contract violations found while reading the generated question set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("expected exactly {expected} questions, got {count}")]
  WrongItemCount { count: usize, expected: usize },

  #[error("question {item}: expected {expected} options, got {count}")]
  WrongOptionCount { item: usize, count: usize, expected: usize },

  #[error("question {item}: correctIndex {index} is outside 0..{options}")]
  CorrectIndexOutOfRange { item: usize, index: i64, options: usize },

  #[error("question {item}: missing question text")]
  MissingQuestion { item: usize },

  #[error("question {item}: missing correctIndex")]
  MissingCorrectIndex { item: usize },

  #[error("question {item}: stream ended before it was complete")]
  Incomplete { item: usize },

  #[error("payload is not a question list: {0}")]
  NotAQuestionList(String),
}

/// Failures of the generation service or of the streamed payload.
#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("generation service not configured")]
  NotConfigured,

  #[error("generation service returned HTTP {status}: {message}")]
  Upstream { status: u16, message: String },

  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed stream event: {0}")]
  MalformedEvent(String),

  #[error("generated content failed validation: {0}")]
  Schema(#[from] ValidationError),

  #[error("stream ended before any content was produced")]
  EmptyStream,

  #[error("generation timed out after {0} seconds")]
  Timeout(u64),

  #[error("superseded by a newer submission")]
  Superseded,

  #[error("generation aborted")]
  Aborted,
}

impl GenerationError {
  /// Short, stable label used as the `error` field in API responses.
  pub fn label(&self) -> &'static str {
    match self {
      GenerationError::NotConfigured => "Missing generation API key",
      GenerationError::Upstream { .. } | GenerationError::Transport(_) => "Generation service failure",
      GenerationError::MalformedEvent(_)
      | GenerationError::Schema(_)
      | GenerationError::EmptyStream => "Failed to parse generated questions",
      GenerationError::Timeout(_) => "Generation timed out",
      GenerationError::Superseded => "Generation superseded",
      GenerationError::Aborted => "Generation aborted",
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("store JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("store lock poisoned")]
  Poisoned,
}

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Input(#[from] InputError),

  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Not found: {0}")]
  NotFound(String),
}

/// Wire shape for failures: `{ error, details? }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Input(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Generation(GenerationError::Superseded) => StatusCode::CONFLICT,
      ApiError::Generation(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn body(&self) -> ErrorBody {
    match self {
      ApiError::Input(e) => ErrorBody { error: "Invalid input".into(), details: Some(e.to_string()) },
      ApiError::Generation(e) => ErrorBody { error: e.label().into(), details: Some(e.to_string()) },
      ApiError::Store(e) => ErrorBody { error: "Storage failure".into(), details: Some(e.to_string()) },
      ApiError::NotFound(what) => ErrorBody { error: format!("Not found: {what}"), details: None },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status(), Json(self.body())).into_response()
  }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
