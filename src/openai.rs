//! Streaming client for the question generation service (OpenAI-compatible chat.completions).
//!
//! The document is forwarded untouched as a `file` content part; the reply is requested
//! with a strict JSON schema and `stream: true`, and the server-sent events are decoded
//! into plain text deltas. Calls log model names and sizes, never contents.
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::config::Prompts;
use crate::domain::QUESTION_COUNT;
use crate::encoder::GenerationRequest;
use crate::error::GenerationError;
use crate::util::{fill_template, trunc_for_log};

/// Text deltas of the generated JSON document, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String, GenerationError>>;

/// Anything that can turn a document into a stream of generated JSON text.
pub trait GenerationService: Send + Sync {
  fn open(&self, prompts: &Prompts, request: &GenerationRequest) -> DeltaStream;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    // No overall timeout here: streams are bounded by the pipeline.
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  fn build_request(&self, prompts: &Prompts, request: &GenerationRequest) -> ChatCompletionRequest {
    let count = QUESTION_COUNT.to_string();
    let user_text = fill_template(
      &prompts.generation_user_template,
      &[("name", request.name()), ("count", &count)],
    );

    ChatCompletionRequest {
      model: self.model.clone(),
      stream: true,
      temperature: 0.7,
      messages: vec![
        ChatMessageReq { role: "system".into(), content: MessageContent::Text(prompts.generation_system.clone()) },
        ChatMessageReq {
          role: "user".into(),
          content: MessageContent::Parts(vec![
            ContentPart::Text { text: user_text },
            ContentPart::File {
              file: FilePart { filename: request.name().to_string(), file_data: request.data_url() },
            },
          ]),
        },
      ],
      response_format: ResponseFormat {
        r#type: "json_schema".into(),
        json_schema: JsonSchemaSpec { name: "question_set".into(), strict: true, schema: question_set_schema() },
      },
    }
  }

  #[instrument(level = "info", skip(self, body), fields(model = %self.model))]
  async fn start(self, body: ChatCompletionRequest) -> Result<DeltaStream, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "kidslearn-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&body).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 300));
      return Err(GenerationError::Upstream { status: status.as_u16(), message });
    }

    info!(target: "generation", status = %res.status(), "Generation stream opened");
    let mut decoder = SseDecoder::default();
    Ok(
      res.bytes_stream()
        .map_err(GenerationError::from)
        .map_ok(move |chunk| futures::stream::iter(decoder.feed(&chunk)))
        .try_flatten()
        .boxed(),
    )
  }
}

impl GenerationService for OpenAI {
  fn open(&self, prompts: &Prompts, request: &GenerationRequest) -> DeltaStream {
    let body = self.build_request(prompts, request);
    debug!(target: "generation", name = %request.name(), bytes = request.byte_len(), "Opening generation stream");
    futures::stream::once(self.clone().start(body)).try_flatten().boxed()
  }
}

/// Stand-in used when no API key is configured: fails every submission.
pub struct Unconfigured;

impl GenerationService for Unconfigured {
  fn open(&self, _prompts: &Prompts, _request: &GenerationRequest) -> DeltaStream {
    futures::stream::once(async { Err(GenerationError::NotConfigured) }).boxed()
  }
}

/// `{"questions": [ {question, options[4], correctIndex} ... ]}`
fn question_set_schema() -> serde_json::Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "required": ["questions"],
    "properties": {
      "questions": {
        "type": "array",
        "description": format!("Exactly {QUESTION_COUNT} questions."),
        "items": {
          "type": "object",
          "additionalProperties": false,
          "required": ["question", "options", "correctIndex"],
          "properties": {
            "question": { "type": "string" },
            "options": {
              "type": "array",
              "description": "Four possible answers. Only one is correct. They should all be of similar length.",
              "items": { "type": "string" }
            },
            "correctIndex": {
              "type": "integer",
              "description": "Index of the correct answer in options (0-3)."
            }
          }
        }
      }
    }
  })
}

/// Splits a server-sent event byte stream into content deltas.
#[derive(Default)]
struct SseDecoder {
  pending: Vec<u8>,
  done: bool,
}

impl SseDecoder {
  fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, GenerationError>> {
    self.pending.extend_from_slice(chunk);
    let mut out = Vec::new();
    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      if self.done {
        continue;
      }
      let line = String::from_utf8_lossy(&line);
      if let Some(event) = self.decode_line(line.trim()) {
        out.push(event);
      }
    }
    out
  }

  fn decode_line(&mut self, line: &str) -> Option<Result<String, GenerationError>> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
      self.done = true;
      return None;
    }
    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
      Ok(c) => c,
      Err(e) => return Some(Err(GenerationError::MalformedEvent(format!("{e}: {}", trunc_for_log(data, 120))))),
    };
    if let Some(err) = chunk.error {
      return Some(Err(GenerationError::Upstream { status: 500, message: err.message }));
    }
    let text: String = chunk
      .choices
      .into_iter()
      .filter_map(|c| c.delta.content)
      .collect();
    if text.is_empty() { None } else { Some(Ok(text)) }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  stream: bool,
  temperature: f32,
  messages: Vec<ChatMessageReq>,
  response_format: ResponseFormat,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: MessageContent }
#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  File { file: FilePart },
}
#[derive(Serialize)]
struct FilePart { filename: String, file_data: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  json_schema: JsonSchemaSpec,
}
#[derive(Serialize)]
struct JsonSchemaSpec { name: String, strict: bool, schema: serde_json::Value }

#[derive(Deserialize)]
struct ChatCompletionChunk {
  #[serde(default)] choices: Vec<ChunkChoice>,
  #[serde(default)] error: Option<ErrorObj>,
}
#[derive(Deserialize)]
struct ChunkChoice { #[serde(default)] delta: ChunkDelta }
#[derive(Deserialize, Default)]
struct ChunkDelta { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct ErrorObj { message: String }

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: ErrorObj }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Limits;

  fn event(content: &str) -> String {
    format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": content } }] }))
  }

  #[test]
  fn decoder_handles_split_events() {
    let raw = format!("{}{}data: [DONE]\n\n", event("{\"questions\":"), event("[]}"));
    let mut decoder = SseDecoder::default();
    let mut texts = Vec::new();
    for piece in raw.as_bytes().chunks(5) {
      for ev in decoder.feed(piece) {
        texts.push(ev.unwrap());
      }
    }
    assert_eq!(texts.concat(), "{\"questions\":[]}");
  }

  #[test]
  fn decoder_ignores_comments_and_role_only_deltas() {
    let mut decoder = SseDecoder::default();
    let raw = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
    assert!(decoder.feed(raw.as_bytes()).is_empty());
  }

  #[test]
  fn decoder_surfaces_errors() {
    let mut decoder = SseDecoder::default();
    let out = decoder.feed(b"data: {\"error\":{\"message\":\"quota\"}}\n");
    assert!(matches!(out.as_slice(), [Err(GenerationError::Upstream { message, .. })] if message == "quota"));

    let out = decoder.feed(b"data: {not json\n");
    assert!(matches!(out.as_slice(), [Err(GenerationError::MalformedEvent(_))]));
  }

  #[test]
  fn decoder_stops_after_done() {
    let mut decoder = SseDecoder::default();
    let raw = format!("data: [DONE]\n{}", event("late"));
    assert!(decoder.feed(raw.as_bytes()).is_empty());
  }

  #[test]
  fn request_carries_document_and_schema() {
    let oa = OpenAI {
      client: reqwest::Client::new(),
      api_key: "k".into(),
      base_url: "http://localhost".into(),
      model: "m".into(),
    };
    let req = GenerationRequest::new("bio.pdf", "application/pdf", b"%PDF".to_vec(), &Limits::default()).unwrap();
    let body = serde_json::to_value(oa.build_request(&Prompts::default(), &req)).unwrap();
    assert_eq!(body["stream"], true);
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["messages"][0]["role"], "system");
    let parts = &body["messages"][1]["content"];
    assert_eq!(parts[0]["type"], "text");
    assert!(parts[0]["text"].as_str().unwrap().contains("bio.pdf"));
    assert_eq!(parts[1]["type"], "file");
    assert_eq!(parts[1]["file"]["file_data"], "data:application/pdf;base64,JVBERg==");
  }

  #[tokio::test]
  async fn unconfigured_service_fails() {
    let req = GenerationRequest::new("a.pdf", "application/pdf", vec![1], &Limits::default()).unwrap();
    let mut stream = Unconfigured.open(&Prompts::default(), &req);
    assert!(matches!(stream.next().await, Some(Err(GenerationError::NotConfigured))));
  }
}
