//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws?sessionId=...`
/// - REST-ish API under `/api/v1/...`, everything scoped to a learner session
/// - CORS (allow any origin/method/headers; adjust for production if needed)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Sessions + generation
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route("/api/v1/sessions/:id", get(http::http_get_session).delete(http::http_close_session))
        .route("/api/v1/sessions/:id/content", delete(http::http_clear_content))
        .route("/api/v1/sessions/:id/view", put(http::http_set_view))
        .route("/api/v1/sessions/:id/generate", post(http::http_generate))
        .route("/api/v1/sessions/:id/generate/abort", post(http::http_abort_generation))
        // Practice
        .route("/api/v1/sessions/:id/matching", get(http::http_get_matching))
        .route("/api/v1/sessions/:id/matching/flip", post(http::http_flip_card))
        .route("/api/v1/sessions/:id/matching/reset", post(http::http_reset_matching))
        .route("/api/v1/sessions/:id/quiz/answer", post(http::http_answer_question))
        .route("/api/v1/sessions/:id/quiz/next", post(http::http_next_question))
        .route("/api/v1/sessions/:id/quiz/restart", post(http::http_restart_quiz))
        .route("/api/v1/sessions/:id/flashcards/next", post(http::http_flashcard_next))
        .route("/api/v1/sessions/:id/flashcards/previous", post(http::http_flashcard_previous))
        .route("/api/v1/sessions/:id/flashcards/flip", post(http::http_flashcard_flip))
        .route("/api/v1/sessions/:id/letters", get(http::http_get_letters))
        .route("/api/v1/sessions/:id/letters/resolve", post(http::http_resolve_letter))
        .route("/api/v1/sessions/:id/letters/reset", post(http::http_reset_letters))
        .route("/api/v1/sessions/:id/letters/history", get(http::http_letter_history))
        .route("/api/v1/sessions/:id/exercises/:exercise", get(http::http_get_exercise))
        .route("/api/v1/sessions/:id/exercises/:exercise/answer", post(http::http_answer_exercise))
        .route("/api/v1/sessions/:id/exercises/:exercise/reset", post(http::http_reset_exercise))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::encoder::encode_data_url;
    use crate::pipeline::testing::ScriptedService;
    use crate::store::MemoryStore;

    fn app() -> Router {
        let state = AppState::with_parts(
            AppConfig::default(),
            Arc::new(ScriptedService::valid()),
            true,
            Arc::new(MemoryStore::new()),
        );
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = call(app, Method::POST, "/api/v1/sessions", Some(json!({ "learnerId": "ana" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call(&app(), Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn session_without_body_uses_guest() {
        let app = app();
        let (status, body) = call(&app, Method::POST, "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["learnerId"], "guest");
        assert_eq!(body["activeView"], "upload");
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let (status, body) = call(&app(), Method::GET, "/api/v1/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn generate_then_play() {
        let app = app();
        let id = new_session(&app).await;
        let files = json!({ "files": [{
            "name": "lesson.pdf",
            "type": "application/pdf",
            "data": encode_data_url("application/pdf", b"%PDF-1.4"),
        }] });

        let (status, body) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/generate"), Some(files)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeView"], "quiz");
        assert_eq!(body["content"]["quiz"].as_array().unwrap().len(), 4);
        assert_eq!(body["content"]["flashcards"][0]["back"], "w0");

        let (_, body) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/quiz/answer"), Some(json!({ "index": 0 }))).await;
        assert_eq!(body["result"]["correct"], true);

        let (_, body) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/matching/flip"), Some(json!({ "cardId": 0 }))).await;
        assert_eq!(body["phase"], "one_flipped");

        let (status, body) = call(&app, Method::PUT, &format!("/api/v1/sessions/{id}/view"), Some(json!({ "view": "matching" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeView"], "matching");
    }

    #[tokio::test]
    async fn generate_rejects_missing_files() {
        let app = app();
        let id = new_session(&app).await;
        let (status, body) =
            call(&app, Method::POST, &format!("/api/v1/sessions/{id}/generate"), Some(json!({ "files": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid input");
        assert_eq!(body["details"], "No files provided");
    }

    #[tokio::test]
    async fn letters_flow_over_http() {
        let app = app();
        let id = new_session(&app).await;
        let (_, body) = call(&app, Method::GET, &format!("/api/v1/sessions/{id}/letters"), None).await;
        assert_eq!(body["window"].as_array().unwrap().len(), 5);

        let (_, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{id}/letters/resolve"),
            Some(json!({ "upper": "A", "lower": "a" })),
        )
        .await;
        assert_eq!(body["correct"], true);
        assert_eq!(body["letters"]["remaining"], 25);

        let (_, body) = call(&app, Method::GET, &format!("/api/v1/sessions/{id}/letters/history"), None).await;
        assert_eq!(body["attempts"].as_array().unwrap().len(), 0);
        assert_eq!(body["best"], Value::Null);
    }

    #[tokio::test]
    async fn deleted_session_is_gone() {
        let app = app();
        let id = new_session(&app).await;
        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn caterpillar_over_http_stores_best() {
        let app = app();
        let id = new_session(&app).await;
        let base = format!("/api/v1/sessions/{id}/exercises/alphabet-caterpillar");

        let (status, body) = call(&app, Method::GET, &base, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gap"], 2);

        let mut last = Value::Null;
        for letter in ["C", "G", "I", "L", "M", "P", "T", "U", "Z"] {
            let (status, body) = call(&app, Method::POST, &format!("{base}/answer"), Some(json!({ "choice": letter }))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["correct"], true);
            last = body;
        }
        assert_eq!(last["best"], 100);
        assert_eq!(last["exercise"]["complete"], true);

        let (_, body) = call(&app, Method::GET, &format!("/api/v1/sessions/{id}/letters/history"), None).await;
        assert_eq!(body["scores"]["alphabetCaterpillar"], 100);

        let (status, _) = call(&app, Method::GET, &format!("/api/v1/sessions/{id}/exercises/hopscotch"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
