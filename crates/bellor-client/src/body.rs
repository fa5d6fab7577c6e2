//! Request body classification.
//!
//! Whether a payload may be key-transformed is decided structurally here,
//! never by a caller-supplied flag: only the JSON arm enters the transformer,
//! multipart and raw-byte payloads go out exactly as built.

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// An outgoing request body.
#[derive(Debug, Clone)]
pub enum Body {
    /// No body.
    Empty,
    /// JSON tree; keys are converted to the wire convention before dispatch.
    Json(Value),
    /// Multipart form (file uploads); sent unmodified with its own
    /// `multipart/form-data` content type.
    Multipart(MultipartPayload),
    /// Raw bytes with an explicit content type; never transformed.
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
}

impl Body {
    /// Serialize a typed value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::Transform(format!("body is not JSON-representable: {}", e)))?;
        Ok(Body::Json(value))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<MultipartPayload> for Body {
    fn from(payload: MultipartPayload) -> Self {
        Body::Multipart(payload)
    }
}

/// Multipart payload assembled by the caller.
///
/// Kept as plain data rather than a `reqwest` form so the pipeline can
/// rebuild the form for the single 401 retry; a `reqwest::multipart::Form`
/// is consumed on send.
#[derive(Debug, Clone, Default)]
pub struct MultipartPayload {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone)]
struct MultipartPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: PartData,
}

#[derive(Debug, Clone)]
enum PartData {
    Text(String),
    Bytes(Vec<u8>),
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: PartData::Text(value.into()),
        });
        self
    }

    /// Add a file field with an explicit content type.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            data: PartData::Bytes(data),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build a fresh `reqwest` form for one dispatch attempt.
    pub(crate) fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            let mut built = match &part.data {
                PartData::Text(text) => Part::text(text.clone()),
                PartData::Bytes(bytes) => Part::bytes(bytes.clone()),
            };
            if let Some(file_name) = &part.file_name {
                built = built.file_name(file_name.clone());
            }
            if let Some(content_type) = &part.content_type {
                built = built
                    .mime_str(content_type)
                    .map_err(|e| Error::Config(format!("invalid part content type: {}", e)))?;
            }
            form = form.part(part.name.clone(), built);
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body_from_typed_value() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Update {
            first_name: String,
        }

        let body = Body::json(&Update {
            first_name: "John".to_string(),
        })
        .unwrap();

        match body {
            Body::Json(value) => assert_eq!(value, json!({"firstName": "John"})),
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    #[test]
    fn test_multipart_payload_builds_form() {
        let payload = MultipartPayload::new()
            .text("display_name", "John")
            .file("image", "me.jpg", "image/jpeg", vec![0xff, 0xd8]);

        assert!(!payload.is_empty());
        assert!(payload.to_form().is_ok());
    }

    #[test]
    fn test_multipart_rejects_bad_content_type() {
        let payload = MultipartPayload::new().file("image", "me.jpg", "not a mime", vec![1]);
        assert!(payload.to_form().is_err());
    }
}
