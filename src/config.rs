//! Loading application configuration (prompts, limits, game timings) from TOML.
//!
//! Every section is optional; missing values fall back to `Default`.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub limits: Limits,
  #[serde(default)]
  pub games: GameTimings,
}

/// Prompts sent to the generation service alongside the document.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  pub generation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are an educational content creator. Respond ONLY with JSON matching the provided schema.".into(),
      generation_user_template: "Based on the attached document '{name}', create {count} multiple-choice questions that test deep understanding of its key concepts.\nRequirements for each question:\n- Clear, concise question that tests comprehension\n- Exactly 4 distinct answer options of similar length\n- correctIndex is the index (0-3) of the single correct option; vary it across questions".into(),
    }
  }
}

/// Upload and stream limits.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
  pub max_document_bytes: usize,
  pub accepted_media_type: String,
  pub generation_timeout_secs: u64,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      max_document_bytes: 5 * 1024 * 1024,
      accepted_media_type: "application/pdf".into(),
      generation_timeout_secs: 120,
    }
  }
}

impl Limits {
  pub fn generation_timeout(&self) -> Duration {
    Duration::from_secs(self.generation_timeout_secs)
  }
}

/// Reveal/hide delays for the matching game.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameTimings {
  pub settle_delay_ms: u64,
  pub revert_delay_ms: u64,
}

impl Default for GameTimings {
  fn default() -> Self {
    Self { settle_delay_ms: 500, revert_delay_ms: 1000 }
  }
}

impl GameTimings {
  pub fn settle_delay(&self) -> Duration {
    Duration::from_millis(self.settle_delay_ms)
  }
  pub fn revert_delay(&self) -> Duration {
    Duration::from_millis(self.revert_delay_ms)
  }
}

/// Load `AppConfig` from LEARN_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("LEARN_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "kidslearn_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "kidslearn_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "kidslearn_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
