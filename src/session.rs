//! Per-session content and active view. The only place views are switched.

use serde::Serialize;
use tracing::debug;

use crate::domain::{DerivedContent, View};

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStore {
  content: Option<DerivedContent>,
  active_view: View,
  /// Bumped on every content change.
  revision: u64,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the content wholesale. The active view is left alone.
  pub fn set_content(&mut self, content: DerivedContent) {
    self.content = Some(content);
    self.revision += 1;
    debug!(target: "kidslearn_backend", revision = self.revision, "Session content replaced");
  }

  /// Always allowed; callers gate views with [`SessionStore::is_view_available`].
  pub fn set_active_view(&mut self, view: View) {
    self.active_view = view;
  }

  /// New content and the quiz view in one step.
  pub fn install(&mut self, content: DerivedContent) {
    self.set_content(content);
    self.set_active_view(View::Quiz);
  }

  pub fn clear(&mut self) {
    self.content = None;
    self.active_view = View::Upload;
    self.revision += 1;
  }

  pub fn content(&self) -> Option<&DerivedContent> {
    self.content.as_ref()
  }

  pub fn active_view(&self) -> View {
    self.active_view
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn is_view_available(&self, view: View) -> bool {
    match view {
      View::Upload => true,
      View::Quiz | View::Flashcards | View::Matching => self.content.as_ref().is_some_and(|c| !c.is_empty()),
    }
  }
}
