//! Normalized rich-content tree.
//!
//! A [`Block`] carries the common record fields plus exactly one
//! [`BlockPayload`] variant selected by its type tag. Container variants own
//! their children; a synced block's children are a resolved copy of the
//! referenced tree, never shared with it.

use serde::{Deserialize, Serialize};

use crate::types::{FileObject, Icon};

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// Inline styling of a rich-text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
    pub color: String,
}

/// The three mutually exclusive rich-text kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RichTextKind {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    Equation {
        expression: String,
    },
    Mention {
        mention_type: String,
        /// Referenced page id for `page` mentions.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_id: Option<String>,
    },
    /// A kind this build does not know about; only the shared fields are kept.
    Other,
}

/// One run of styled inline content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub annotation: Annotation,
    pub plain_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub kind: RichTextKind,
}

/// Concatenate the plain text of a run list.
pub fn plain_text(rich_texts: &[RichText]) -> String {
    rich_texts.iter().map(|rt| rt.plain_text.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Paragraph, list items, quote, and toggle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub rich_texts: Vec<RichText>,
    pub color: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub rich_texts: Vec<RichText>,
    pub color: String,
    pub is_toggleable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToDo {
    pub rich_texts: Vec<RichText>,
    pub checked: bool,
    pub color: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

/// Video and file blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaBlock {
    pub caption: Vec<RichText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FileObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub caption: Vec<RichText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FileObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub caption: Vec<RichText>,
    pub rich_texts: Vec<RichText>,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Callout {
    pub rich_texts: Vec<RichText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    pub color: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

/// A block whose content is another block's subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncedBlock {
    /// Referenced block id; `None` for an original (source) synced block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub caption: Vec<RichText>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub rich_texts: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub id: String,
    pub has_children: bool,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub table_width: u32,
    pub has_column_header: bool,
    pub has_row_header: bool,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub has_children: bool,
    #[serde(default)]
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnList {
    #[serde(default)]
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOfContents {
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkToPage {
    pub link_type: String,
    pub page_id: String,
}

/// Exactly one payload per block, selected by the block's type tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockPayload {
    /// Unknown type tag or unreadable payload; only common fields are set.
    #[default]
    Unsupported,
    Paragraph(TextBlock),
    #[serde(rename = "heading_1")]
    Heading1(Heading),
    #[serde(rename = "heading_2")]
    Heading2(Heading),
    #[serde(rename = "heading_3")]
    Heading3(Heading),
    BulletedListItem(TextBlock),
    NumberedListItem(TextBlock),
    ToDo(ToDo),
    Video(MediaBlock),
    Image(ImageBlock),
    File(MediaBlock),
    Code(Code),
    Quote(TextBlock),
    Equation(Equation),
    Callout(Callout),
    SyncedBlock(SyncedBlock),
    Toggle(TextBlock),
    Embed(Embed),
    Bookmark(Bookmark),
    LinkPreview(LinkPreview),
    Table(Table),
    ColumnList(ColumnList),
    TableOfContents(TableOfContents),
    LinkToPage(LinkToPage),
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One node of normalized rich content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    /// Remote type tag, kept verbatim even for unsupported types.
    pub block_type: String,
    pub has_children: bool,
    pub payload: BlockPayload,
}

impl Block {
    /// A block with common fields only.
    pub fn unsupported(id: impl Into<String>, block_type: impl Into<String>, has_children: bool) -> Self {
        Self {
            id: id.into(),
            block_type: block_type.into(),
            has_children,
            payload: BlockPayload::Unsupported,
        }
    }

    /// The child list owned by this block's payload, if its variant has one.
    ///
    /// Column lists and tables are not included: their children live inside
    /// [`Column`] and [`TableRow`] records.
    pub fn children(&self) -> Option<&[Block]> {
        match &self.payload {
            BlockPayload::Paragraph(b)
            | BlockPayload::BulletedListItem(b)
            | BlockPayload::NumberedListItem(b)
            | BlockPayload::Quote(b)
            | BlockPayload::Toggle(b) => Some(&b.children),
            BlockPayload::Heading1(h) | BlockPayload::Heading2(h) | BlockPayload::Heading3(h) => {
                Some(&h.children)
            }
            BlockPayload::ToDo(t) => Some(&t.children),
            BlockPayload::Callout(c) => Some(&c.children),
            BlockPayload::SyncedBlock(s) => Some(&s.children),
            _ => None,
        }
    }

    /// Mutable access to the child list, for the tree assembler.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Block>> {
        match &mut self.payload {
            BlockPayload::Paragraph(b)
            | BlockPayload::BulletedListItem(b)
            | BlockPayload::NumberedListItem(b)
            | BlockPayload::Quote(b)
            | BlockPayload::Toggle(b) => Some(&mut b.children),
            BlockPayload::Heading1(h) | BlockPayload::Heading2(h) | BlockPayload::Heading3(h) => {
                Some(&mut h.children)
            }
            BlockPayload::ToDo(t) => Some(&mut t.children),
            BlockPayload::Callout(c) => Some(&mut c.children),
            BlockPayload::SyncedBlock(s) => Some(&mut s.children),
            _ => None,
        }
    }

    /// Rich text shown as this block's own content, if any.
    pub fn rich_texts(&self) -> Option<&[RichText]> {
        match &self.payload {
            BlockPayload::Paragraph(b)
            | BlockPayload::BulletedListItem(b)
            | BlockPayload::NumberedListItem(b)
            | BlockPayload::Quote(b)
            | BlockPayload::Toggle(b) => Some(&b.rich_texts),
            BlockPayload::Heading1(h) | BlockPayload::Heading2(h) | BlockPayload::Heading3(h) => {
                Some(&h.rich_texts)
            }
            BlockPayload::ToDo(t) => Some(&t.rich_texts),
            BlockPayload::Callout(c) => Some(&c.rich_texts),
            BlockPayload::Code(c) => Some(&c.rich_texts),
            _ => None,
        }
    }

    /// Visit this block and every descendant in document order, columns included.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Block)) {
        visit(self);
        if let Some(children) = self.children() {
            for child in children {
                child.walk(visit);
            }
        }
        if let BlockPayload::ColumnList(list) = &self.payload {
            for column in &list.columns {
                for child in &column.children {
                    child.walk(visit);
                }
            }
        }
    }
}
