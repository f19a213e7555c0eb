//! Documents travel as base64 data URLs (`data:<type>;base64,<payload>`).
//! This module builds them and turns uploaded ones back into checked requests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::Limits;
use crate::error::InputError;
use crate::protocol::FileData;

/// One document, checked against the upload limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
  name: String,
  media_type: String,
  bytes: Vec<u8>,
}

impl GenerationRequest {
  pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>, limits: &Limits) -> Result<Self, InputError> {
    let media_type = media_type.into();
    if media_type != limits.accepted_media_type {
      return Err(InputError::UnsupportedType { found: media_type, expected: limits.accepted_media_type.clone() });
    }
    if bytes.is_empty() {
      return Err(InputError::Empty);
    }
    if bytes.len() > limits.max_document_bytes {
      return Err(InputError::TooLarge { size: bytes.len(), max: limits.max_document_bytes });
    }
    Ok(Self { name: name.into(), media_type, bytes })
  }

  /// Decode the first uploaded file. Extra files are ignored.
  pub fn from_upload(files: &[FileData], limits: &Limits) -> Result<Self, InputError> {
    let file = files.first().ok_or(InputError::NoFiles)?;
    let payload = match file.data.split_once("base64,") {
      Some((_, payload)) => payload,
      None => return Err(InputError::Malformed("expected a base64 data URL".into())),
    };

    // Reject before decoding anything absurd: 4 base64 chars carry 3 bytes.
    let approx = payload.len() / 4 * 3;
    if approx > limits.max_document_bytes + 3 {
      return Err(InputError::TooLarge { size: approx, max: limits.max_document_bytes });
    }

    let bytes = BASE64
      .decode(payload.trim())
      .map_err(|e| InputError::Malformed(format!("failed to decode file data: {e}")))?;
    Self::new(file.name.clone(), file.media_type.clone(), bytes, limits)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn byte_len(&self) -> usize {
    self.bytes.len()
  }

  pub fn data_url(&self) -> String {
    encode_data_url(&self.media_type, &self.bytes)
  }
}

pub fn encode_data_url(media_type: &str, bytes: &[u8]) -> String {
  format!("data:{};base64,{}", media_type, BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pdf(bytes: &[u8]) -> FileData {
    FileData { name: "notes.pdf".into(), media_type: "application/pdf".into(), data: encode_data_url("application/pdf", bytes) }
  }

  #[test]
  fn upload_round_trips_through_data_url() {
    let limits = Limits::default();
    let req = GenerationRequest::from_upload(&[pdf(b"%PDF-1.4 hello")], &limits).unwrap();
    assert_eq!(req.name(), "notes.pdf");
    assert_eq!(req.byte_len(), 14);
    assert_eq!(req.data_url(), pdf(b"%PDF-1.4 hello").data);
  }

  #[test]
  fn rejects_missing_and_empty() {
    let limits = Limits::default();
    assert_eq!(GenerationRequest::from_upload(&[], &limits), Err(InputError::NoFiles));
    assert_eq!(GenerationRequest::from_upload(&[pdf(b"")], &limits), Err(InputError::Empty));
  }

  #[test]
  fn rejects_wrong_type() {
    let limits = Limits::default();
    let mut file = pdf(b"text");
    file.media_type = "text/plain".into();
    assert!(matches!(
      GenerationRequest::from_upload(&[file], &limits),
      Err(InputError::UnsupportedType { .. })
    ));
  }

  #[test]
  fn rejects_oversized() {
    let limits = Limits { max_document_bytes: 8, ..Limits::default() };
    assert_eq!(
      GenerationRequest::new("a.pdf", "application/pdf", vec![0u8; 9], &limits),
      Err(InputError::TooLarge { size: 9, max: 8 })
    );
    let big = pdf(&[1u8; 64]);
    assert!(matches!(GenerationRequest::from_upload(&[big], &limits), Err(InputError::TooLarge { .. })));
  }

  #[test]
  fn rejects_non_data_url_and_bad_base64() {
    let limits = Limits::default();
    let mut file = pdf(b"x");
    file.data = "https://example.com/doc.pdf".into();
    assert!(matches!(GenerationRequest::from_upload(&[file.clone()], &limits), Err(InputError::Malformed(_))));
    file.data = "data:application/pdf;base64,@@@".into();
    assert!(matches!(GenerationRequest::from_upload(&[file], &limits), Err(InputError::Malformed(_))));
  }
}
