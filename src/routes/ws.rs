//! WebSocket upgrade + message loop for one learner session. Each client message is
//! parsed as JSON and forwarded to core logic; session events (generation progress,
//! matching timers, results from other tabs) are pushed as they happen.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::{
  sync::{broadcast::error::RecvError, mpsc},
  task::JoinHandle,
};
use tracing::{info, error, instrument, debug, warn};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, FileData, ServerWsMessage, WsQuery};
use crate::state::{AppState, LearnerSession};

#[instrument(level = "info", skip(ws, state), fields(session = %q.session_id))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
  let session = find_session(&state, &q.session_id).await?;
  info!(target: "kidslearn_backend", "WebSocket upgrade requested");
  Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, session)))
}

#[instrument(level = "info", skip_all, fields(session = %session.id))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, session: Arc<LearnerSession>) {
  info!(target: "kidslearn_backend", "WebSocket connected");
  let mut events = session.subscribe();
  // Replies produced after the handler returned, for this socket only.
  let (replies, mut deferred) = mpsc::unbounded_channel();

  loop {
    let outgoing = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "kidslearn_backend", len = txt.len(), "WS message received");
            handle_client_ws(msg, &state, &session, &replies).await
          }
          Err(e) => Some(ServerWsMessage::Error { error: format!("Invalid JSON: {}", e), details: None }),
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          None
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => None,
        Some(Err(e)) => {
          warn!(target: "kidslearn_backend", error = %e, "WS receive error");
          break;
        }
      },
      event = events.recv() => match event {
        Ok(event) => Some(event),
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "kidslearn_backend", skipped, "WS subscriber lagged; resending session");
          Some(ServerWsMessage::Session { session: session.snapshot().await })
        }
        Err(RecvError::Closed) => break,
      },
      Some(reply) = deferred.recv() => Some(reply),
    };

    let Some(reply) = outgoing else { continue };
    let closing = matches!(reply, ServerWsMessage::SessionClosed { .. });
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "error": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "kidslearn_backend", error = %e, "WS send error");
      break;
    }
    if closing {
      break;
    }
  }
  info!(target: "kidslearn_backend", "WebSocket disconnected");
}

fn error_message(e: ApiError) -> ServerWsMessage {
  let body = e.body();
  ServerWsMessage::Error { error: body.error, details: body.details }
}

/// Run a generation asked for over WebSocket. Progress and the installed content reach
/// every socket as session events; a failure goes back only through `replies`.
fn spawn_generation(
  state: Arc<AppState>,
  session: Arc<LearnerSession>,
  files: Vec<FileData>,
  replies: mpsc::UnboundedSender<ServerWsMessage>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    if let Err(e) = generate(&state, &session, &files).await {
      let _ = replies.send(error_message(e));
    }
  })
}

/// Replies that are also broadcast as events (matching flips, letter results, view
/// changes) are not returned here; the socket receives them through its subscription.
#[instrument(level = "info", skip_all)]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  session: &Arc<LearnerSession>,
  replies: &mpsc::UnboundedSender<ServerWsMessage>,
) -> Option<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => Some(ServerWsMessage::Pong),

    ClientWsMessage::GetSession => Some(ServerWsMessage::Session { session: session.snapshot().await }),

    ClientWsMessage::SetView { view } => {
      set_view(session, view).await;
      None
    }

    ClientWsMessage::ClearContent => {
      clear_content(session).await;
      None
    }

    ClientWsMessage::Generate { files } => {
      spawn_generation(state.clone(), session.clone(), files, replies.clone());
      None
    }

    ClientWsMessage::AbortGeneration => {
      if abort_generation(session).is_none() {
        return Some(ServerWsMessage::Generation { status: session.pipeline.status() });
      }
      None
    }

    ClientWsMessage::GetMatching => Some(ServerWsMessage::Matching { matching: matching_snapshot(session).await }),

    ClientWsMessage::FlipCard { card_id } => {
      flip_card(session, card_id).await;
      None
    }

    ClientWsMessage::ResetMatching => {
      reset_matching(session).await;
      None
    }

    ClientWsMessage::AnswerQuestion { index } => {
      let (result, quiz) = answer_question(session, index).await;
      Some(match result {
        Some(result) => ServerWsMessage::AnswerResult { result, quiz },
        None => ServerWsMessage::Quiz { quiz },
      })
    }

    ClientWsMessage::NextQuestion => Some(ServerWsMessage::Quiz { quiz: next_question(session).await }),

    ClientWsMessage::RestartQuiz => Some(ServerWsMessage::Quiz { quiz: restart_quiz(session).await }),

    ClientWsMessage::NextFlashcard => {
      Some(ServerWsMessage::Flashcards { flashcards: move_flashcard(session, CardMove::Next).await })
    }

    ClientWsMessage::PreviousFlashcard => {
      Some(ServerWsMessage::Flashcards { flashcards: move_flashcard(session, CardMove::Previous).await })
    }

    ClientWsMessage::FlipFlashcard => {
      Some(ServerWsMessage::Flashcards { flashcards: move_flashcard(session, CardMove::Flip).await })
    }

    ClientWsMessage::GetLetters => Some(ServerWsMessage::Letters { letters: letters_snapshot(session).await }),

    ClientWsMessage::ResolveLetter { upper, lower } => match resolve_letter(state, session, upper, lower).await {
      Ok(out) if out.correct.is_none() && out.recorded.is_none() => Some(ServerWsMessage::Letters { letters: out.letters }),
      Ok(_) => None,
      Err(e) => Some(error_message(e)),
    },

    ClientWsMessage::ResetLetters => match reset_letters(state, session).await {
      Ok(letters) => Some(ServerWsMessage::Letters { letters }),
      Err(e) => Some(error_message(e)),
    },

    ClientWsMessage::LetterHistory => match letter_history(state, session) {
      Ok(history) => Some(ServerWsMessage::History { history }),
      Err(e) => Some(error_message(e)),
    },

    ClientWsMessage::GetExercise { exercise } => {
      Some(ServerWsMessage::Exercise { exercise: exercise_snapshot(session, exercise).await })
    }

    ClientWsMessage::AnswerExercise { exercise, choice } => match answer_exercise(state, session, exercise, &choice).await {
      Ok(out) if out.correct.is_none() && out.best.is_none() => Some(ServerWsMessage::Exercise { exercise: out.exercise }),
      Ok(_) => None,
      Err(e) => Some(error_message(e)),
    },

    ClientWsMessage::ResetExercise { exercise } => match reset_exercise(state, session, exercise).await {
      Ok(exercise) => Some(ServerWsMessage::Exercise { exercise }),
      Err(e) => Some(error_message(e)),
    },
  }
}
