//! Render category inference
//!
//! Classification is a pure, total function tried in a fixed order. Each
//! stage only runs when every earlier stage was inconclusive:
//!
//! 1. category declared by the caller
//! 2. declared content type (prefix match)
//! 3. file-name extension
//! 4. URL suffix (extension of the last path segment, query stripped)
//! 5. sniffed magic bytes
//! 6. [`RenderCategory::Unsupported`]

use crate::file::{FileReference, RenderCategory};

/// Stage that produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyStage {
    Declared,
    ContentType,
    Extension,
    UrlSuffix,
    Sniffed,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: RenderCategory,
    pub stage: ClassifyStage,
}

/// Content type prefixes, most specific first
const CONTENT_TYPE_PREFIXES: &[(&str, RenderCategory)] = &[
    ("application/pdf", RenderCategory::Document),
    ("application/msword", RenderCategory::Document),
    ("application/vnd.openxmlformats-officedocument", RenderCategory::Document),
    ("application/vnd.oasis.opendocument", RenderCategory::Document),
    ("application/vnd.ms-", RenderCategory::Document),
    ("application/rtf", RenderCategory::Document),
    ("image/", RenderCategory::Image),
    ("audio/", RenderCategory::Audio),
    ("video/", RenderCategory::Video),
    ("text/", RenderCategory::PlainText),
    ("application/json", RenderCategory::PlainText),
    ("application/xml", RenderCategory::PlainText),
];

const EXTENSIONS: &[(&str, RenderCategory)] = &[
    ("pdf", RenderCategory::Document),
    ("doc", RenderCategory::Document),
    ("docx", RenderCategory::Document),
    ("odt", RenderCategory::Document),
    ("rtf", RenderCategory::Document),
    ("ppt", RenderCategory::Document),
    ("pptx", RenderCategory::Document),
    ("xls", RenderCategory::Document),
    ("xlsx", RenderCategory::Document),
    ("png", RenderCategory::Image),
    ("jpg", RenderCategory::Image),
    ("jpeg", RenderCategory::Image),
    ("gif", RenderCategory::Image),
    ("webp", RenderCategory::Image),
    ("bmp", RenderCategory::Image),
    ("svg", RenderCategory::Image),
    ("tif", RenderCategory::Image),
    ("tiff", RenderCategory::Image),
    ("heic", RenderCategory::Image),
    ("avif", RenderCategory::Image),
    ("mp3", RenderCategory::Audio),
    ("wav", RenderCategory::Audio),
    ("ogg", RenderCategory::Audio),
    ("oga", RenderCategory::Audio),
    ("m4a", RenderCategory::Audio),
    ("aac", RenderCategory::Audio),
    ("flac", RenderCategory::Audio),
    ("opus", RenderCategory::Audio),
    ("mp4", RenderCategory::Video),
    ("m4v", RenderCategory::Video),
    ("mov", RenderCategory::Video),
    ("webm", RenderCategory::Video),
    ("mkv", RenderCategory::Video),
    ("avi", RenderCategory::Video),
    ("ogv", RenderCategory::Video),
    ("txt", RenderCategory::PlainText),
    ("md", RenderCategory::PlainText),
    ("csv", RenderCategory::PlainText),
    ("json", RenderCategory::PlainText),
    ("xml", RenderCategory::PlainText),
    ("log", RenderCategory::PlainText),
    ("yaml", RenderCategory::PlainText),
    ("yml", RenderCategory::PlainText),
];

/// Inputs for one classification
#[derive(Debug, Clone, Default)]
pub struct ClassifyRequest<'a> {
    name: &'a str,
    declared: Option<RenderCategory>,
    content_type: Option<&'a str>,
    url: Option<&'a str>,
    sniffed: Option<&'a [u8]>,
}

impl<'a> ClassifyRequest<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Seed a request from a file reference's declared fields
    pub fn for_file(file: &'a FileReference) -> Self {
        Self {
            name: &file.name,
            declared: file.category,
            content_type: file.content_type.as_deref(),
            ..Default::default()
        }
    }

    pub fn declared(mut self, category: Option<RenderCategory>) -> Self {
        self.declared = category;
        self
    }

    pub fn content_type(mut self, content_type: Option<&'a str>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn url(mut self, url: Option<&'a str>) -> Self {
        self.url = url;
        self
    }

    pub fn sniffed(mut self, prefix: Option<&'a [u8]>) -> Self {
        self.sniffed = prefix;
        self
    }

    /// Run the stages in order
    pub fn classify(&self) -> Classification {
        let tagged = |stage: ClassifyStage| move |category: RenderCategory| Classification { category, stage };

        self.declared
            .map(tagged(ClassifyStage::Declared))
            .or_else(|| {
                self.content_type
                    .and_then(category_for_content_type)
                    .map(tagged(ClassifyStage::ContentType))
            })
            .or_else(|| category_for_path(self.name).map(tagged(ClassifyStage::Extension)))
            .or_else(|| {
                self.url
                    .and_then(|url| category_for_path(strip_query(url)))
                    .map(tagged(ClassifyStage::UrlSuffix))
            })
            .or_else(|| self.sniffed.and_then(sniff).map(tagged(ClassifyStage::Sniffed)))
            .unwrap_or(Classification {
                category: RenderCategory::Unsupported,
                stage: ClassifyStage::Fallback,
            })
    }
}

/// Classify from a name, an optional declared content type and an optional
/// sniffed byte prefix
pub fn classify(name: &str, content_type: Option<&str>, sniffed: Option<&[u8]>) -> RenderCategory {
    ClassifyRequest::new(name)
        .content_type(content_type)
        .sniffed(sniffed)
        .classify()
        .category
}

fn category_for_content_type(content_type: &str) -> Option<RenderCategory> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    CONTENT_TYPE_PREFIXES
        .iter()
        .find(|(prefix, _)| essence.starts_with(prefix))
        .map(|(_, category)| *category)
}

/// Extension lookup; case-insensitive
pub fn category_for_extension(extension: &str) -> Option<RenderCategory> {
    let extension = extension.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, category)| *category)
}

fn category_for_path(path: &str) -> Option<RenderCategory> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    // A bare ".pdf" still carries an extension; dotfiles fall through on it.
    let (_, extension) = segment.rsplit_once('.')?;
    category_for_extension(extension)
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Recognise well-known magic numbers
fn sniff(prefix: &[u8]) -> Option<RenderCategory> {
    const SIGNATURES: &[(&[u8], RenderCategory)] = &[
        (b"%PDF-", RenderCategory::Document),
        (b"\x89PNG\r\n\x1a\n", RenderCategory::Image),
        (b"\xff\xd8\xff", RenderCategory::Image),
        (b"GIF87a", RenderCategory::Image),
        (b"GIF89a", RenderCategory::Image),
        (b"\x1a\x45\xdf\xa3", RenderCategory::Video),
        (b"OggS", RenderCategory::Audio),
        (b"fLaC", RenderCategory::Audio),
        (b"ID3", RenderCategory::Audio),
    ];

    if let Some((_, category)) = SIGNATURES.iter().find(|(magic, _)| prefix.starts_with(magic)) {
        return Some(*category);
    }

    // RIFF containers carry the format at offset 8
    if prefix.len() >= 12 && &prefix[..4] == b"RIFF" {
        return match &prefix[8..12] {
            b"WEBP" => Some(RenderCategory::Image),
            b"WAVE" => Some(RenderCategory::Audio),
            b"AVI " => Some(RenderCategory::Video),
            _ => None,
        };
    }

    // ISO-BMFF (mp4/mov/m4a): size then "ftyp"
    if prefix.len() >= 12 && &prefix[4..8] == b"ftyp" {
        return match &prefix[8..12] {
            b"M4A " => Some(RenderCategory::Audio),
            b"avif" | b"heic" => Some(RenderCategory::Image),
            _ => Some(RenderCategory::Video),
        };
    }

    None
}
