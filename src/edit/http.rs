//! HTTP adapters for the generative editor and title rewriter
//!
//! # Wire format
//!
//! `POST {base}/edit` with
//! `{"image": "<base64 png>", "instruction": "...", "category": "shoes"}`
//! returns `{"image": "<base64 image>"}`.
//!
//! `POST {base}/rewrite-title` with `{"title": "...", "category": "shoes"}`
//! returns `{"title": "..."}`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{validate_instruction, EditError, ImageEditor, Result, TitleRewriter};
use crate::photo::Photograph;
use crate::remote::{decode_image, encode_image, RemoteClient, RemoteError, ServiceConfig};
use crate::retry::RetryPolicy;

const EDIT_PATH: &str = "edit";
const TITLE_PATH: &str = "rewrite-title";

#[derive(Debug, Serialize)]
struct EditRequest<'a> {
    image: &'a str,
    instruction: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct TitleRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TitleResponse {
    title: Option<String>,
}

// ============================================================
// Image editor
// ============================================================

/// Remote generative image editor
pub struct HttpImageEditor {
    client: RemoteClient,
    retry: RetryPolicy,
}

impl HttpImageEditor {
    pub fn new(config: &ServiceConfig, retry: RetryPolicy) -> std::result::Result<Self, RemoteError> {
        Ok(Self {
            client: RemoteClient::new("editor", config)?,
            retry,
        })
    }
}

impl ImageEditor for HttpImageEditor {
    fn edit(
        &self,
        photo: &Photograph,
        instruction: &str,
        category: Option<&str>,
    ) -> Result<Photograph> {
        let instruction = validate_instruction(instruction)?;
        let image = encode_image(photo)?;
        let request = EditRequest {
            image: &image,
            instruction,
            category,
        };

        let response: EditResponse = self.retry.run("edit", || {
            self.client
                .post_json(EDIT_PATH, &request)
                .map_err(EditError::from)
        })?;

        let payload = response
            .image
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| EditError::Malformed("response has no image".into()))?;

        let edited = decode_image(&payload).map_err(EditError::Malformed)?;
        debug!(
            "Editor returned {}x{} image",
            edited.width(),
            edited.height()
        );
        Ok(edited)
    }
}

// ============================================================
// Title rewriter
// ============================================================

/// Remote title rewriting service
pub struct HttpTitleRewriter {
    client: RemoteClient,
    retry: RetryPolicy,
}

impl HttpTitleRewriter {
    pub fn new(config: &ServiceConfig, retry: RetryPolicy) -> std::result::Result<Self, RemoteError> {
        Ok(Self {
            client: RemoteClient::new("title", config)?,
            retry,
        })
    }
}

impl TitleRewriter for HttpTitleRewriter {
    fn rewrite(&self, title: &str, category: Option<&str>) -> Result<String> {
        let request = TitleRequest { title, category };

        let response: TitleResponse = self.retry.run("rewrite-title", || {
            self.client
                .post_json(TITLE_PATH, &request)
                .map_err(EditError::from)
        })?;

        response
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EditError::Malformed("response has no title".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_request_omits_missing_category() {
        let request = EditRequest {
            image: "abc",
            instruction: "remove logo",
            category: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("category"));
        assert!(json.contains("\"instruction\":\"remove logo\""));
    }

    #[test]
    fn test_empty_instruction_rejected_before_network() {
        // Port 9 (discard) is never contacted: validation fails first.
        let editor =
            HttpImageEditor::new(&ServiceConfig::at("http://127.0.0.1:9"), RetryPolicy::none())
                .unwrap();
        let photo = Photograph::from_rgb(image::RgbImage::new(4, 4));
        let result = editor.edit(&photo, "   ", None);
        assert!(matches!(result, Err(EditError::EmptyInstruction)));
    }

    #[test]
    fn test_title_response_parsing() {
        let response: TitleResponse = serde_json::from_str(r#"{"title": " Runner 90 "}"#).unwrap();
        assert_eq!(response.title.as_deref(), Some(" Runner 90 "));
    }
}
