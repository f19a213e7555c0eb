//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs ids and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::error::ApiResult;
use crate::exercises::Exercise;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generation_configured: state.generation_configured })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<CreateSessionIn>>,
) -> ApiResult<impl IntoResponse> {
  let Json(body) = body.unwrap_or_default();
  let session = state.create_session(body.learner_id).await?;
  Ok((StatusCode::CREATED, Json(session.snapshot().await)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<SessionOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(session.snapshot().await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_close_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<StatusCode> {
  close_session(&state, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_content(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<SessionOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(clear_content(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(view = ?body.view))]
pub async fn http_set_view(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SetViewIn>,
) -> ApiResult<Json<SessionOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(set_view(&session, body.view).await))
}

#[instrument(level = "info", skip(state, body), fields(files = body.files.len()))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<GenerateIn>,
) -> ApiResult<Json<SessionOut>> {
  let session = find_session(&state, &id).await?;
  let out = generate(&state, &session, &body.files).await?;
  info!(target: "generation", session = %id, revision = out.revision, "HTTP generate finished");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_abort_generation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<AbortOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(AbortOut { aborted: abort_generation(&session) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_matching(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(matching_snapshot(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(card_id = body.card_id))]
pub async fn http_flip_card(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<FlipIn>,
) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(flip_card(&session, body.card_id).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_matching(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(reset_matching(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(index = body.index))]
pub async fn http_answer_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> ApiResult<Json<AnswerOut>> {
  let session = find_session(&state, &id).await?;
  let (result, quiz) = answer_question(&session, body.index).await;
  Ok(Json(AnswerOut { result, quiz }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_next_question(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(next_question(&session).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_restart_quiz(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(restart_quiz(&session).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_flashcard_next(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(move_flashcard(&session, CardMove::Next).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_flashcard_previous(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(move_flashcard(&session, CardMove::Previous).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_flashcard_flip(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(move_flashcard(&session, CardMove::Flip).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_letters(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(letters_snapshot(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(upper = %body.upper))]
pub async fn http_resolve_letter(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ResolveLetterIn>,
) -> ApiResult<Json<ResolveLetterOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(resolve_letter(&state, &session, body.upper, body.lower).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_letters(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(reset_letters(&state, &session).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_letter_history(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<HistoryOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(letter_history(&state, &session)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_exercise(
  State(state): State<Arc<AppState>>,
  Path((id, exercise)): Path<(String, Exercise)>,
) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(exercise_snapshot(&session, exercise).await))
}

#[instrument(level = "info", skip(state, body), fields(choice = %body.choice))]
pub async fn http_answer_exercise(
  State(state): State<Arc<AppState>>,
  Path((id, exercise)): Path<(String, Exercise)>,
  Json(body): Json<ExerciseAnswerIn>,
) -> ApiResult<Json<ExerciseAnswerOut>> {
  let session = find_session(&state, &id).await?;
  Ok(Json(answer_exercise(&state, &session, exercise, &body.choice).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_exercise(
  State(state): State<Arc<AppState>>,
  Path((id, exercise)): Path<(String, Exercise)>,
) -> ApiResult<impl IntoResponse> {
  let session = find_session(&state, &id).await?;
  Ok(Json(reset_exercise(&state, &session, exercise).await?))
}
