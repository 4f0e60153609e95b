//! Core domain types: posts, the database record, file references.

use std::future::Future;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Files and icons
// ---------------------------------------------------------------------------

/// Where a file reference is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Linked from a third-party host.
    External,
    /// Uploaded to the content service (signed, expiring URL).
    File,
}

/// A remote file reference, optionally enriched with pixel dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub kind: FileKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl FileObject {
    /// A file reference with no expiry and no known dimensions.
    pub fn new(kind: FileKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            expiry_time: None,
            width: None,
            height: None,
        }
    }

    /// Copy probed dimensions onto this reference.
    pub fn with_dimensions(mut self, dims: ImageDimensions) -> Self {
        self.width = dims.width;
        self.height = dims.height;
        self
    }
}

/// Page, database, or callout icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Emoji(String),
    File(FileObject),
}

/// A select / multi-select option (tags).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProperty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

// ---------------------------------------------------------------------------
// Post / Database
// ---------------------------------------------------------------------------

/// One published page of the content database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub page_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<FileObject>,
    pub slug: String,
    /// Publish date (`YYYY-MM-DD` or RFC 3339).
    pub date: String,
    /// Last explicit update; falls back to `date`.
    pub update_date: String,
    #[serde(default)]
    pub tags: Vec<SelectProperty>,
    /// Explicit excerpt; falls back to the title.
    pub excerpt: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<FileObject>,
    #[serde(default)]
    pub rank: i64,
    pub last_edited_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_share_hashtags: Option<String>,
    #[serde(default)]
    pub related_post_page_ids: Vec<String>,
    #[serde(default)]
    pub internal_tags: Vec<SelectProperty>,
    #[serde(default)]
    pub published: bool,
}

/// Metadata of the content database itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<FileObject>,
}

// ---------------------------------------------------------------------------
// Dimension probing
// ---------------------------------------------------------------------------

/// Pixel dimensions of a remote image; both absent when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Out-of-band lookup of an image's dimensions.
///
/// Implementations must not fail: an unreachable or undecodable image
/// resolves to [`ImageDimensions::default`].
pub trait DimensionProbe: Send + Sync {
    fn dimensions(&self, url: &str) -> impl Future<Output = ImageDimensions> + Send;
}

/// Probe used in fast mode: never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl DimensionProbe for NoProbe {
    async fn dimensions(&self, _url: &str) -> ImageDimensions {
        ImageDimensions::default()
    }
}

/// `None` behaves like [`NoProbe`].
impl<P: DimensionProbe> DimensionProbe for Option<P> {
    async fn dimensions(&self, url: &str) -> ImageDimensions {
        match self {
            Some(probe) => probe.dimensions(url).await,
            None => ImageDimensions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_serialization_is_tagged() {
        let icon = Icon::Emoji("🏠".into());
        let json = serde_json::to_string(&icon).expect("serialize");
        assert_eq!(json, r#"{"emoji":"🏠"}"#);

        let file = Icon::File(FileObject::new(FileKind::External, "https://x.test/a.png"));
        let json = serde_json::to_value(&file).expect("serialize");
        assert_eq!(json["file"]["kind"], "external");
    }

    #[test]
    fn dimensions_are_copied() {
        let file = FileObject::new(FileKind::File, "https://x.test/a.png").with_dimensions(
            ImageDimensions {
                width: Some(640),
                height: Some(480),
            },
        );
        assert_eq!(file.width, Some(640));
        assert_eq!(file.height, Some(480));
    }

    #[tokio::test]
    async fn no_probe_reports_nothing() {
        let dims = NoProbe.dimensions("https://x.test/a.png").await;
        assert_eq!(dims, ImageDimensions::default());

        let disabled: Option<NoProbe> = None;
        assert_eq!(disabled.dimensions("https://x.test/a.png").await, ImageDimensions::default());
    }
}
