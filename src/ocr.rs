//! Text detection through the Google Cloud Vision `images:annotate` API.

use base64::{engine::general_purpose, Engine as _};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result of one text-detection call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDetection {
    /// Annotation texts; the first one holds the full detected text.
    pub annotations: Vec<String>,
    /// Error reported by the service alongside (or instead of) annotations.
    pub error: Option<String>,
}

impl TextDetection {
    pub fn full_text(&self) -> Option<&str> {
        self.annotations.first().map(String::as_str)
    }
}

/// Something that can read text out of JPEG bytes. Shared across requests.
pub trait TextDetector: Send + Sync {
    fn detect_text<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<TextDetection, OcrError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    ApiKey(String),
    BearerToken(String),
    None,
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<Status>,
}

#[derive(Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    credential: Credential,
}

impl VisionClient {
    pub fn new(endpoint: String, credential: Credential, timeout: Duration) -> Result<Self, OcrError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::Network(e.to_string()))?;
        Ok(VisionClient {
            http_client,
            endpoint,
            credential,
        })
    }

    async fn annotate(&self, image: &[u8]) -> Result<TextDetection, OcrError> {
        let body = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent {
                    content: general_purpose::STANDARD.encode(image),
                },
                features: [Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        match &self.credential {
            Credential::ApiKey(key) => request = request.query(&[("key", key.as_str())]),
            Credential::BearerToken(token) => request = request.bearer_auth(token),
            Credential::None => {}
        }

        debug!("Submitting {} image bytes for text detection", image.len());
        let response = request
            .send()
            .await
            .map_err(|e| OcrError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OcrError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(OcrError::Api(status.as_u16(), text));
        }
        parse_annotate_response(&text)
    }
}

impl TextDetector for VisionClient {
    fn detect_text<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<TextDetection, OcrError>> {
        self.annotate(image).boxed()
    }
}

fn parse_annotate_response(body: &str) -> Result<TextDetection, OcrError> {
    let parsed: AnnotateResponse =
        serde_json::from_str(body).map_err(|e| OcrError::Parse(e.to_string()))?;
    let first = match parsed.responses.into_iter().next() {
        Some(r) => r,
        None => return Ok(TextDetection::default()),
    };
    Ok(TextDetection {
        annotations: first
            .text_annotations
            .into_iter()
            .map(|a| a.description)
            .collect(),
        error: first
            .error
            .map(|s| s.message)
            .filter(|message| !message.is_empty()),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_annotations_in_order() {
        let body = r#"{
            "responses": [{
                "textAnnotations": [
                    {"locale": "es", "description": "PERU\nABC-123\n"},
                    {"description": "PERU"},
                    {"description": "ABC-123"}
                ],
                "fullTextAnnotation": {"text": "PERU\nABC-123\n"}
            }]
        }"#;
        let detection = parse_annotate_response(body).unwrap();
        assert_eq!(detection.full_text(), Some("PERU\nABC-123\n"));
        assert_eq!(detection.annotations.len(), 3);
        assert_eq!(detection.error, None);
    }

    #[test]
    fn empty_response_has_no_text() {
        let detection = parse_annotate_response(r#"{"responses": [{}]}"#).unwrap();
        assert_eq!(detection, TextDetection::default());
        assert_eq!(detection.full_text(), None);

        let detection = parse_annotate_response("{}").unwrap();
        assert_eq!(detection, TextDetection::default());
    }

    #[test]
    fn service_error_is_reported() {
        let body = r#"{"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}"#;
        let detection = parse_annotate_response(body).unwrap();
        assert_eq!(detection.error.as_deref(), Some("Bad image data."));
        assert!(detection.annotations.is_empty());
    }

    #[test]
    fn blank_error_message_is_not_an_error() {
        let body = r#"{"responses": [{"error": {"code": 0, "message": ""}}]}"#;
        assert_eq!(parse_annotate_response(body).unwrap().error, None);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_annotate_response("<html>"),
            Err(OcrError::Parse(_))
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent {
                    content: general_purpose::STANDARD.encode(b"jpeg"),
                },
                features: [Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "requests": [{
                    "image": {"content": "anBlZw=="},
                    "features": [{"type": "TEXT_DETECTION"}]
                }]
            })
        );
    }
}
