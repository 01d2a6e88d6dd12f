//! File references and render categories

use serde::{Deserialize, Serialize};

/// Identifies a stored asset selected by the embedding UI
///
/// Immutable once created; selecting a different file creates a new
/// reference and tears down whatever was rendering the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Opaque storage path understood by the backend
    pub path: String,

    /// Declared display name (usually carries the extension)
    pub name: String,

    /// Declared content type, if the uploader supplied one
    #[serde(default)]
    pub content_type: Option<String>,

    /// Declared size in bytes
    #[serde(default)]
    pub size: u64,

    /// Category the caller already knows, skipping inference
    #[serde(default)]
    pub category: Option<RenderCategory>,
}

impl FileReference {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            content_type: None,
            size: 0,
            category: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_category(mut self, category: RenderCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// How a file is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderCategory {
    /// Paginated document
    Document,
    Image,
    Audio,
    Video,
    PlainText,
    Unsupported,
}

impl RenderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderCategory::Document => "document",
            RenderCategory::Image => "image",
            RenderCategory::Audio => "audio",
            RenderCategory::Video => "video",
            RenderCategory::PlainText => "plain_text",
            RenderCategory::Unsupported => "unsupported",
        }
    }

    /// Continuous media driven by a transport
    pub fn is_media(&self) -> bool {
        matches!(self, RenderCategory::Audio | RenderCategory::Video)
    }
}

impl std::fmt::Display for RenderCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let file = FileReference::new("cases/42/brief.pdf", "brief.pdf")
            .with_content_type("application/pdf")
            .with_size(2048);

        assert_eq!(file.path, "cases/42/brief.pdf");
        assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(file.size, 2048);
        assert_eq!(file.category, None);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&RenderCategory::PlainText).unwrap();
        assert_eq!(json, "\"plain_text\"");
        assert_eq!(RenderCategory::PlainText.to_string(), "plain_text");
    }

    #[test]
    fn test_reference_deserializes_with_defaults() {
        let file: FileReference =
            serde_json::from_str(r#"{"path":"a/b.mp4","name":"b.mp4"}"#).unwrap();
        assert_eq!(file.content_type, None);
        assert_eq!(file.size, 0);
        assert!(RenderCategory::Video.is_media());
    }
}
