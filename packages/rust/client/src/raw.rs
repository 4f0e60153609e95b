//! Raw API records, deserialized as-is before normalization.
//!
//! Block payloads stay as JSON values keyed by the block's type tag; each
//! builder in [`crate::normalize`] reads its own payload shape.

use serde::Deserialize;
use serde_json::{Map, Value};

use blockfeed_shared::{FileKind, FileObject, Icon};

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A block record as returned by the children listing or block retrieve.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    /// Every other field, including the payload stored under `kind`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawBlock {
    /// The type-specific payload object.
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(&self.kind)
    }
}

/// A database row (page).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPage {
    pub id: String,
    #[serde(default)]
    pub icon: Option<RawFile>,
    #[serde(default)]
    pub cover: Option<RawFile>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub last_edited_time: String,
}

/// The database record itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDatabase {
    #[serde(default)]
    pub title: Vec<RawRichText>,
    #[serde(default)]
    pub description: Vec<RawRichText>,
    #[serde(default)]
    pub icon: Option<RawFile>,
    #[serde(default)]
    pub cover: Option<RawFile>,
}

// ---------------------------------------------------------------------------
// Files, icons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawUrl {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHostedFile {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

/// File, external link, or emoji. Used for icons, covers, and media sources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFile {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub external: Option<RawUrl>,
    #[serde(default)]
    pub file: Option<RawHostedFile>,
}

impl RawFile {
    /// Convert an `external` or `file` reference. Emoji and empty URLs yield `None`.
    pub fn to_file_object(&self) -> Option<FileObject> {
        match self.kind.as_str() {
            "external" => {
                let url = self.external.as_ref()?.url.clone();
                (!url.is_empty()).then(|| FileObject::new(FileKind::External, url))
            }
            "file" => {
                let hosted = self.file.as_ref()?;
                if hosted.url.is_empty() {
                    return None;
                }
                let mut file = FileObject::new(FileKind::File, hosted.url.clone());
                file.expiry_time = hosted.expiry_time.clone();
                Some(file)
            }
            _ => None,
        }
    }

    /// Convert to an icon (emoji or file reference).
    pub fn to_icon(&self) -> Option<Icon> {
        match (self.kind.as_str(), &self.emoji) {
            ("emoji", Some(emoji)) => Some(Icon::Emoji(emoji.clone())),
            _ => self.to_file_object().map(Icon::File),
        }
    }

    /// URL of whichever source is populated, `external` first.
    pub fn any_url(&self) -> Option<&str> {
        self.external
            .as_ref()
            .map(|e| e.url.as_str())
            .or_else(|| self.file.as_ref().map(|f| f.url.as_str()))
            .filter(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnnotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawText {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub link: Option<RawUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEquation {
    #[serde(default)]
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReference {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMention {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub page: Option<RawReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRichText {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: RawAnnotations,
    #[serde(default)]
    pub text: Option<RawText>,
    #[serde(default)]
    pub equation: Option<RawEquation>,
    #[serde(default)]
    pub mention: Option<RawMention>,
}
