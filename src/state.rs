//! Application state: configuration, the generation service, learner history and
//! the registry of learner sessions.
//!
//! A `LearnerSession` owns its content store and one instance of every practice
//! engine. Engines are built from clones of the installed content and rebuilt
//! whenever the content changes. Lock order is store first, then engines.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{load_config_from_env, AppConfig};
use crate::domain::{DerivedContent, GameKind, View};
use crate::error::StoreError;
use crate::exercises::ExerciseBoard;
use crate::history::AttemptHistory;
use crate::letters::LetterGame;
use crate::matching::MatchingGame;
use crate::openai::{GenerationService, OpenAI, Unconfigured};
use crate::partial::PartialResult;
use crate::pipeline::GenerationPipeline;
use crate::practice::{FlashcardDeck, QuizRun};
use crate::protocol::{ServerWsMessage, SessionOut};
use crate::session::SessionStore;
use crate::store::{store_from_env, KvStore};

const EVENT_CAPACITY: usize = 64;

pub struct AppState {
  pub config: AppConfig,
  pub generator: Arc<dyn GenerationService>,
  pub generation_configured: bool,
  pub history: AttemptHistory,
  sessions: RwLock<HashMap<String, Arc<LearnerSession>>>,
}

impl AppState {
  /// Build state from env: load config, open the learner store, init the generation client.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let config = load_config_from_env().unwrap_or_default();
    let store: Arc<dyn KvStore> = Arc::from(store_from_env());

    match OpenAI::from_env() {
      Some(oa) => {
        info!(target: "kidslearn_backend", base_url = %oa.base_url, model = %oa.model, "Generation service enabled.");
        Self::with_parts(config, Arc::new(oa), true, store)
      }
      None => {
        info!(target: "kidslearn_backend", "Generation disabled (no OPENAI_API_KEY). Submissions will fail.");
        Self::with_parts(config, Arc::new(Unconfigured), false, store)
      }
    }
  }

  pub fn with_parts(
    config: AppConfig,
    generator: Arc<dyn GenerationService>,
    generation_configured: bool,
    store: Arc<dyn KvStore>,
  ) -> Self {
    Self {
      config,
      generator,
      generation_configured,
      history: AttemptHistory::new(store),
      sessions: RwLock::new(HashMap::new()),
    }
  }

  #[instrument(level = "info", skip(self))]
  pub async fn create_session(&self, learner_id: Option<String>) -> Result<Arc<LearnerSession>, StoreError> {
    let learner_id = learner_id.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "guest".into());
    let prior = self.history.attempts(GameKind::LetterMatching, &learner_id)?.len();
    let session = Arc::new(LearnerSession::new(Uuid::new_v4().to_string(), learner_id, prior, &self.config));
    self.sessions.write().await.insert(session.id.clone(), session.clone());
    info!(target: "kidslearn_backend", id = %session.id, learner = %session.learner_id, prior_attempts = prior, "Session created");
    Ok(session)
  }

  pub async fn session(&self, id: &str) -> Option<Arc<LearnerSession>> {
    self.sessions.read().await.get(id).cloned()
  }

  pub async fn remove_session(&self, id: &str) -> Option<Arc<LearnerSession>> {
    let removed = self.sessions.write().await.remove(id);
    if removed.is_some() {
      info!(target: "kidslearn_backend", %id, "Session removed");
    }
    removed
  }
}

pub struct LearnerSession {
  pub id: String,
  pub learner_id: String,
  pub store: RwLock<SessionStore>,
  pub pipeline: GenerationPipeline,
  pub matching: Mutex<MatchingGame>,
  pub quiz: Mutex<QuizRun>,
  pub flashcards: Mutex<FlashcardDeck>,
  pub letters: Mutex<LetterGame>,
  pub exercises: Mutex<ExerciseBoard>,
  events: broadcast::Sender<ServerWsMessage>,
}

impl LearnerSession {
  pub fn new(id: String, learner_id: String, prior_attempts: usize, config: &AppConfig) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      id,
      learner_id,
      store: RwLock::new(SessionStore::new()),
      pipeline: GenerationPipeline::new(),
      matching: Mutex::new(MatchingGame::new(Vec::new(), config.games.clone())),
      quiz: Mutex::new(QuizRun::default()),
      flashcards: Mutex::new(FlashcardDeck::default()),
      letters: Mutex::new(LetterGame::new(prior_attempts)),
      exercises: Mutex::new(ExerciseBoard::default()),
      events,
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ServerWsMessage> {
    self.events.subscribe()
  }

  /// Push an event to every connected socket. Nobody listening is fine.
  pub fn publish(&self, event: ServerWsMessage) {
    let _ = self.events.send(event);
  }

  /// Stop in-flight generation and tell connected sockets the session is gone.
  pub fn close(&self) {
    if let Some(generation) = self.pipeline.abort() {
      info!(target: "generation", session = %self.id, generation, "Generation aborted with its session");
    }
    self.publish(ServerWsMessage::SessionClosed { id: self.id.clone() });
  }

  pub fn publish_status(&self) {
    self.publish(ServerWsMessage::Generation { status: self.pipeline.status() });
  }

  /// Progress callback for the running stream of `generation`.
  pub fn on_progress(&self, generation: u64, progress: u8, snapshot: &PartialResult) {
    if self.pipeline.report(generation, progress, snapshot) {
      debug!(target: "generation", session = %self.id, generation, progress, items = snapshot.items.len(), "Generation progress");
      self.publish_status();
    }
  }

  /// Install content for `generation` unless a newer submission took over.
  pub async fn commit(&self, generation: u64, content: DerivedContent) -> bool {
    let mut store = self.store.write().await;
    if !self.pipeline.is_current(generation) {
      return false;
    }
    store.install(content);
    self.reload_engines(store.content()).await;
    true
  }

  pub async fn clear(&self) {
    let mut store = self.store.write().await;
    store.clear();
    self.reload_engines(None).await;
  }

  pub async fn set_view(&self, view: View) {
    self.store.write().await.set_active_view(view);
  }

  async fn reload_engines(&self, content: Option<&DerivedContent>) {
    let (quiz, flashcards, matching) = match content {
      Some(c) => (c.quiz().to_vec(), c.flashcards().to_vec(), c.matching().to_vec()),
      None => (Vec::new(), Vec::new(), Vec::new()),
    };
    *self.quiz.lock().await = QuizRun::new(quiz);
    *self.flashcards.lock().await = FlashcardDeck::new(flashcards);
    self.matching.lock().await.load(matching);
  }

  pub async fn snapshot(&self) -> SessionOut {
    let store = self.store.read().await;
    let available_views = [View::Upload, View::Quiz, View::Flashcards, View::Matching]
      .into_iter()
      .filter(|v| store.is_view_available(*v))
      .collect();
    SessionOut {
      id: self.id.clone(),
      learner_id: self.learner_id.clone(),
      active_view: store.active_view(),
      available_views,
      content: store.content().cloned(),
      revision: store.revision(),
      generation: self.pipeline.status(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn state_with(generator: Arc<dyn GenerationService>) -> AppState {
    AppState::with_parts(AppConfig::default(), generator, true, Arc::new(MemoryStore::new()))
  }

  #[tokio::test]
  async fn sessions_are_registered() {
    let state = state_with(Arc::new(Unconfigured));
    let s = state.create_session(Some("ana".into())).await.unwrap();
    assert_eq!(s.learner_id, "ana");
    assert!(state.session(&s.id).await.is_some());
    assert!(state.session("nope").await.is_none());

    let guest = state.create_session(Some("  ".into())).await.unwrap();
    assert_eq!(guest.learner_id, "guest");
  }

  #[tokio::test]
  async fn removed_sessions_are_gone_and_announce_it() {
    let state = state_with(Arc::new(Unconfigured));
    let s = state.create_session(None).await.unwrap();
    let mut events = s.subscribe();

    let removed = state.remove_session(&s.id).await.expect("registered");
    removed.close();
    assert!(state.session(&s.id).await.is_none());
    assert!(state.remove_session(&s.id).await.is_none());
    assert!(matches!(events.try_recv(), Ok(ServerWsMessage::SessionClosed { id }) if id == s.id));
  }

  #[tokio::test]
  async fn new_session_is_empty() {
    let state = state_with(Arc::new(Unconfigured));
    let s = state.create_session(None).await.unwrap();
    let snap = s.snapshot().await;
    assert!(snap.content.is_none());
    assert_eq!(snap.active_view, View::Upload);
    assert_eq!(snap.available_views, vec![View::Upload]);
    assert_eq!(s.letters.lock().await.attempt_number(), 1);
  }
}
