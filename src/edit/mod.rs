//! Generative edit module
//!
//! Adapters for the remote content-aware image editor and the title
//! rewriting service.
//!
//! The image editor is best-effort: the returned photograph keeps the same
//! subject, but nothing guarantees the marks named in the instruction are
//! gone. That is why every edit is followed by re-detection.

mod http;

pub use http::{HttpImageEditor, HttpTitleRewriter};

use thiserror::Error;

use crate::photo::{EncodeError, Photograph};
use crate::remote::RemoteError;
use crate::retry::Retryable;

/// Edit error types
#[derive(Debug, Error)]
pub enum EditError {
    #[error("Edit instruction is empty")]
    EmptyInstruction,

    #[error("Edit service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Malformed edit response: {0}")]
    Malformed(String),

    #[error("Could not encode image for editing: {0}")]
    Encode(#[from] EncodeError),

    #[error("Edit failed: {0}")]
    Failed(String),
}

impl Retryable for EditError {
    fn is_transient(&self) -> bool {
        match self {
            EditError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;

/// Content-aware image editor driven by natural-language instructions
pub trait ImageEditor: Send + Sync {
    /// Apply `instruction` to `photo`; `category` is an optional product hint
    fn edit(&self, photo: &Photograph, instruction: &str, category: Option<&str>)
        -> Result<Photograph>;
}

/// Rewrites product titles so they no longer name the brand
pub trait TitleRewriter: Send + Sync {
    fn rewrite(&self, title: &str, category: Option<&str>) -> Result<String>;
}

/// Title rewriter that returns the title unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTitle;

impl TitleRewriter for PassthroughTitle {
    fn rewrite(&self, title: &str, _category: Option<&str>) -> Result<String> {
        Ok(title.to_string())
    }
}

/// Reject blank instructions before they reach the editor
pub fn validate_instruction(instruction: &str) -> Result<&str> {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        Err(EditError::EmptyInstruction)
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_instruction() {
        assert!(matches!(validate_instruction("  \n"), Err(EditError::EmptyInstruction)));
        assert_eq!(validate_instruction(" remove logo ").unwrap(), "remove logo");
    }

    #[test]
    fn test_passthrough_title() {
        let title = PassthroughTitle.rewrite("Nike Air Max 90", Some("shoes")).unwrap();
        assert_eq!(title, "Nike Air Max 90");
    }

    #[test]
    fn test_transient_only_for_remote() {
        assert!(!EditError::EmptyInstruction.is_transient());
        let remote = EditError::Remote(RemoteError::Timeout {
            endpoint: "edit".into(),
        });
        assert!(remote.is_transient());
    }
}
