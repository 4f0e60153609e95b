//! Raw block record → typed [`Block`].
//!
//! Dispatch goes through a registry of per-type builders keyed by the
//! record's type tag. Builders are pure; the only side effect is the image
//! dimension lookup performed after an `image` payload is built.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use blockfeed_shared::{
    Annotation, Block, BlockPayload, Bookmark, Callout, Code, DimensionProbe, Embed, Equation,
    FileKind, Heading, ImageBlock, LinkPreview, LinkToPage, MediaBlock, RichText, RichTextKind,
    SyncedBlock, Table, TableCell, TableOfContents, TableRow, TextBlock, ToDo,
};

use crate::raw::{RawBlock, RawFile, RawRichText};

type BuildResult = std::result::Result<BlockPayload, serde_json::Error>;

/// Builds one payload variant from the JSON stored under the type tag.
pub type BlockBuilder = fn(&Value) -> BuildResult;

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Converts raw block records into [`Block`]s.
pub struct Normalizer<P> {
    builders: HashMap<&'static str, BlockBuilder>,
    probe: P,
}

impl<P: DimensionProbe> Normalizer<P> {
    /// A normalizer with every built-in block type registered.
    pub fn new(probe: P) -> Self {
        let mut builders: HashMap<&'static str, BlockBuilder> = HashMap::new();
        builders.insert("paragraph", paragraph);
        builders.insert("heading_1", heading_1);
        builders.insert("heading_2", heading_2);
        builders.insert("heading_3", heading_3);
        builders.insert("bulleted_list_item", bulleted_list_item);
        builders.insert("numbered_list_item", numbered_list_item);
        builders.insert("to_do", to_do);
        builders.insert("video", video);
        builders.insert("image", image);
        builders.insert("file", file);
        builders.insert("code", code);
        builders.insert("quote", quote);
        builders.insert("equation", equation);
        builders.insert("callout", callout);
        builders.insert("synced_block", synced_block);
        builders.insert("toggle", toggle);
        builders.insert("embed", embed);
        builders.insert("bookmark", bookmark);
        builders.insert("link_preview", link_preview);
        builders.insert("table", table);
        builders.insert("column_list", column_list);
        builders.insert("table_of_contents", table_of_contents);
        builders.insert("link_to_page", link_to_page);

        Self { builders, probe }
    }

    /// Register (or replace) the builder for a type tag.
    pub fn register(&mut self, block_type: &'static str, builder: BlockBuilder) {
        self.builders.insert(block_type, builder);
    }

    /// The image dimension probe.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Whether a builder exists for `block_type`.
    pub fn supports(&self, block_type: &str) -> bool {
        self.builders.contains_key(block_type)
    }

    /// Normalize one record. Unknown types and unreadable payloads keep only the common fields.
    pub async fn normalize(&self, raw: &RawBlock) -> Block {
        let mut block = Block::unsupported(raw.id.clone(), raw.kind.clone(), raw.has_children);

        let Some(builder) = self.builders.get(raw.kind.as_str()) else {
            debug!(block_id = %raw.id, block_type = %raw.kind, "no builder for block type");
            return block;
        };

        let empty = Value::Object(Default::default());
        let payload = raw.payload().unwrap_or(&empty);
        match builder(payload) {
            Ok(built) => block.payload = built,
            Err(e) => {
                warn!(block_id = %raw.id, block_type = %raw.kind, error = %e, "malformed block payload");
                return block;
            }
        }

        if let BlockPayload::Image(image) = &mut block.payload {
            self.probe_image(image).await;
        }

        block
    }

    async fn probe_image(&self, image: &mut ImageBlock) {
        let Some(source) = image.source.as_mut() else {
            return;
        };
        if source.url.is_empty() {
            return;
        }

        let dims = self.probe.dimensions(&source.url).await;
        image.width = dims.width;
        image.height = dims.height;
        if source.kind == FileKind::File {
            source.width = dims.width;
            source.height = dims.height;
        }
    }
}

// ---------------------------------------------------------------------------
// Rich text and table rows
// ---------------------------------------------------------------------------

/// Convert one raw rich-text run.
pub fn rich_text(raw: &RawRichText) -> RichText {
    let a = &raw.annotations;
    let annotation = Annotation {
        bold: a.bold,
        italic: a.italic,
        strikethrough: a.strikethrough,
        underline: a.underline,
        code: a.code,
        color: a.color.clone(),
    };

    let kind = match (raw.kind.as_str(), &raw.text, &raw.equation, &raw.mention) {
        ("text", Some(text), _, _) => RichTextKind::Text {
            content: text.content.clone(),
            link: text.link.as_ref().map(|l| l.url.clone()),
        },
        ("equation", _, Some(eq), _) => RichTextKind::Equation {
            expression: eq.expression.clone(),
        },
        ("mention", _, _, Some(mention)) => RichTextKind::Mention {
            mention_type: mention.kind.clone(),
            page_id: match mention.kind.as_str() {
                "page" => mention.page.as_ref().map(|p| p.id.clone()),
                _ => None,
            },
        },
        _ => RichTextKind::Other,
    };

    RichText {
        annotation,
        plain_text: raw.plain_text.clone(),
        href: raw.href.clone(),
        kind,
    }
}

fn rich_texts(raw: &[RawRichText]) -> Vec<RichText> {
    raw.iter().map(rich_text).collect()
}

#[derive(Deserialize)]
struct RawTableRow {
    #[serde(default)]
    cells: Vec<Vec<RawRichText>>,
}

/// Convert a `table_row` record. Rows of any other type keep no cells.
pub fn table_row(raw: &RawBlock) -> TableRow {
    let cells = match (raw.kind.as_str(), raw.payload()) {
        ("table_row", Some(payload)) => match RawTableRow::deserialize(payload) {
            Ok(row) => row
                .cells
                .iter()
                .map(|cell| TableCell {
                    rich_texts: rich_texts(cell),
                })
                .collect(),
            Err(e) => {
                warn!(block_id = %raw.id, error = %e, "malformed table row");
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    TableRow {
        id: raw.id.clone(),
        has_children: raw.has_children,
        cells,
    }
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawTextPayload {
    #[serde(default)]
    rich_text: Vec<RawRichText>,
    #[serde(default)]
    color: String,
    #[serde(default)]
    is_toggleable: bool,
    #[serde(default)]
    checked: bool,
}

impl RawTextPayload {
    fn text_block(&self) -> TextBlock {
        TextBlock {
            rich_texts: rich_texts(&self.rich_text),
            color: self.color.clone(),
            children: Vec::new(),
        }
    }

    fn heading(&self) -> Heading {
        Heading {
            rich_texts: rich_texts(&self.rich_text),
            color: self.color.clone(),
            is_toggleable: self.is_toggleable,
            children: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawMediaPayload {
    #[serde(default)]
    caption: Vec<RawRichText>,
    #[serde(flatten)]
    source: RawFile,
}

impl RawMediaPayload {
    fn media(&self) -> MediaBlock {
        MediaBlock {
            caption: rich_texts(&self.caption),
            source: self.source.to_file_object(),
        }
    }
}

#[derive(Deserialize)]
struct RawCodePayload {
    #[serde(default)]
    caption: Vec<RawRichText>,
    #[serde(default)]
    rich_text: Vec<RawRichText>,
    #[serde(default)]
    language: String,
}

#[derive(Deserialize)]
struct RawEquationPayload {
    #[serde(default)]
    expression: String,
}

#[derive(Deserialize)]
struct RawCalloutPayload {
    #[serde(default)]
    rich_text: Vec<RawRichText>,
    #[serde(default)]
    icon: Option<RawFile>,
    #[serde(default)]
    color: String,
}

#[derive(Deserialize)]
struct RawSyncedFrom {
    #[serde(default)]
    block_id: Option<String>,
}

#[derive(Deserialize)]
struct RawSyncedPayload {
    #[serde(default)]
    synced_from: Option<RawSyncedFrom>,
}

#[derive(Deserialize)]
struct RawUrlPayload {
    #[serde(default)]
    url: String,
    #[serde(default)]
    caption: Vec<RawRichText>,
}

#[derive(Deserialize)]
struct RawTablePayload {
    #[serde(default)]
    table_width: u32,
    #[serde(default)]
    has_column_header: bool,
    #[serde(default)]
    has_row_header: bool,
}

#[derive(Deserialize)]
struct RawColorPayload {
    #[serde(default)]
    color: String,
}

#[derive(Deserialize)]
struct RawLinkToPagePayload {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    page_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn paragraph(v: &Value) -> BuildResult {
    Ok(BlockPayload::Paragraph(RawTextPayload::deserialize(v)?.text_block()))
}

fn heading_1(v: &Value) -> BuildResult {
    Ok(BlockPayload::Heading1(RawTextPayload::deserialize(v)?.heading()))
}

fn heading_2(v: &Value) -> BuildResult {
    Ok(BlockPayload::Heading2(RawTextPayload::deserialize(v)?.heading()))
}

fn heading_3(v: &Value) -> BuildResult {
    Ok(BlockPayload::Heading3(RawTextPayload::deserialize(v)?.heading()))
}

fn bulleted_list_item(v: &Value) -> BuildResult {
    Ok(BlockPayload::BulletedListItem(RawTextPayload::deserialize(v)?.text_block()))
}

fn numbered_list_item(v: &Value) -> BuildResult {
    Ok(BlockPayload::NumberedListItem(RawTextPayload::deserialize(v)?.text_block()))
}

fn to_do(v: &Value) -> BuildResult {
    let raw = RawTextPayload::deserialize(v)?;
    Ok(BlockPayload::ToDo(ToDo {
        rich_texts: rich_texts(&raw.rich_text),
        checked: raw.checked,
        color: raw.color,
        children: Vec::new(),
    }))
}

fn quote(v: &Value) -> BuildResult {
    Ok(BlockPayload::Quote(RawTextPayload::deserialize(v)?.text_block()))
}

fn toggle(v: &Value) -> BuildResult {
    Ok(BlockPayload::Toggle(RawTextPayload::deserialize(v)?.text_block()))
}

fn video(v: &Value) -> BuildResult {
    Ok(BlockPayload::Video(RawMediaPayload::deserialize(v)?.media()))
}

fn file(v: &Value) -> BuildResult {
    Ok(BlockPayload::File(RawMediaPayload::deserialize(v)?.media()))
}

fn image(v: &Value) -> BuildResult {
    let media = RawMediaPayload::deserialize(v)?.media();
    Ok(BlockPayload::Image(ImageBlock {
        caption: media.caption,
        source: media.source,
        width: None,
        height: None,
    }))
}

fn code(v: &Value) -> BuildResult {
    let raw = RawCodePayload::deserialize(v)?;
    Ok(BlockPayload::Code(Code {
        caption: rich_texts(&raw.caption),
        rich_texts: rich_texts(&raw.rich_text),
        language: raw.language,
    }))
}

fn equation(v: &Value) -> BuildResult {
    let raw = RawEquationPayload::deserialize(v)?;
    Ok(BlockPayload::Equation(Equation {
        expression: raw.expression,
    }))
}

fn callout(v: &Value) -> BuildResult {
    let raw = RawCalloutPayload::deserialize(v)?;
    Ok(BlockPayload::Callout(Callout {
        rich_texts: rich_texts(&raw.rich_text),
        icon: raw.icon.as_ref().and_then(RawFile::to_icon),
        color: raw.color,
        children: Vec::new(),
    }))
}

fn synced_block(v: &Value) -> BuildResult {
    let raw = RawSyncedPayload::deserialize(v)?;
    Ok(BlockPayload::SyncedBlock(SyncedBlock {
        synced_from: raw
            .synced_from
            .and_then(|from| from.block_id)
            .filter(|id| !id.is_empty()),
        children: Vec::new(),
    }))
}

fn embed(v: &Value) -> BuildResult {
    Ok(BlockPayload::Embed(Embed {
        url: RawUrlPayload::deserialize(v)?.url,
    }))
}

fn bookmark(v: &Value) -> BuildResult {
    let raw = RawUrlPayload::deserialize(v)?;
    Ok(BlockPayload::Bookmark(Bookmark {
        caption: rich_texts(&raw.caption),
        url: raw.url,
    }))
}

fn link_preview(v: &Value) -> BuildResult {
    Ok(BlockPayload::LinkPreview(LinkPreview {
        url: RawUrlPayload::deserialize(v)?.url,
    }))
}

fn table(v: &Value) -> BuildResult {
    let raw = RawTablePayload::deserialize(v)?;
    Ok(BlockPayload::Table(Table {
        table_width: raw.table_width,
        has_column_header: raw.has_column_header,
        has_row_header: raw.has_row_header,
        rows: Vec::new(),
    }))
}

fn column_list(_v: &Value) -> BuildResult {
    Ok(BlockPayload::ColumnList(Default::default()))
}

fn table_of_contents(v: &Value) -> BuildResult {
    Ok(BlockPayload::TableOfContents(TableOfContents {
        color: RawColorPayload::deserialize(v)?.color,
    }))
}

fn link_to_page(v: &Value) -> BuildResult {
    let raw = RawLinkToPagePayload::deserialize(v)?;
    match raw.page_id {
        Some(page_id) if !page_id.is_empty() => Ok(BlockPayload::LinkToPage(LinkToPage {
            link_type: raw.kind,
            page_id,
        })),
        // Links to databases or comments carry no page id.
        _ => Ok(BlockPayload::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use blockfeed_shared::{Icon, ImageDimensions, NoProbe};

    fn load_fixture(name: &str) -> Vec<RawBlock> {
        let path = format!("../../../fixtures/notion/{name}");
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing fixture: {path}"));
        serde_json::from_str(&content).expect("parse fixture")
    }

    fn find<'a>(raws: &'a [RawBlock], id: &str) -> &'a RawBlock {
        raws.iter().find(|b| b.id == id).expect("fixture block")
    }

    struct FixedProbe {
        calls: AtomicUsize,
    }

    impl DimensionProbe for FixedProbe {
        async fn dimensions(&self, _url: &str) -> ImageDimensions {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ImageDimensions {
                width: Some(1200),
                height: Some(800),
            }
        }
    }

    #[tokio::test]
    async fn paragraph_with_mixed_rich_text() {
        let raws = load_fixture("blocks.json");
        let block = Normalizer::new(NoProbe).normalize(find(&raws, "para-1")).await;

        let BlockPayload::Paragraph(p) = &block.payload else {
            panic!("expected paragraph, got {:?}", block.payload);
        };
        assert_eq!(p.rich_texts.len(), 3);
        assert!(p.rich_texts[0].annotation.bold);
        assert!(matches!(
            &p.rich_texts[0].kind,
            RichTextKind::Text { link: Some(url), .. } if url == "https://example.com/"
        ));
        assert!(matches!(
            &p.rich_texts[1].kind,
            RichTextKind::Equation { expression } if expression == "x^2"
        ));
        assert!(matches!(
            &p.rich_texts[2].kind,
            RichTextKind::Mention { mention_type, page_id: Some(id) }
                if mention_type == "page" && id == "page-42"
        ));
    }

    #[tokio::test]
    async fn unknown_type_keeps_common_fields() {
        let raws = load_fixture("blocks.json");
        let block = Normalizer::new(NoProbe).normalize(find(&raws, "unknown-1")).await;

        assert_eq!(block.block_type, "ai_summary");
        assert!(block.has_children);
        assert_eq!(block.payload, BlockPayload::Unsupported);
    }

    #[tokio::test]
    async fn image_dimensions_are_probed() {
        let raws = load_fixture("blocks.json");
        let probe = FixedProbe {
            calls: AtomicUsize::new(0),
        };
        let normalizer = Normalizer::new(probe);
        let block = normalizer.normalize(find(&raws, "image-1")).await;

        let BlockPayload::Image(image) = &block.payload else {
            panic!("expected image");
        };
        assert_eq!(image.width, Some(1200));
        assert_eq!(image.height, Some(800));
        let source = image.source.as_ref().unwrap();
        assert_eq!(source.kind, FileKind::File);
        assert_eq!(source.width, Some(1200));
        assert_eq!(normalizer.probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fast_mode_skips_dimensions() {
        let raws = load_fixture("blocks.json");
        let block = Normalizer::new(NoProbe).normalize(find(&raws, "image-1")).await;
        let BlockPayload::Image(image) = &block.payload else {
            panic!("expected image");
        };
        assert_eq!(image.width, None);
        assert_eq!(image.caption[0].plain_text, "A caption");
    }

    #[tokio::test]
    async fn callout_and_synced_payloads() {
        let raws = load_fixture("blocks.json");
        let normalizer = Normalizer::new(NoProbe);

        let callout = normalizer.normalize(find(&raws, "callout-1")).await;
        let BlockPayload::Callout(c) = &callout.payload else {
            panic!("expected callout");
        };
        assert_eq!(c.icon, Some(Icon::Emoji("💡".into())));
        assert_eq!(c.color, "gray_background");

        let synced = normalizer.normalize(find(&raws, "synced-1")).await;
        let BlockPayload::SyncedBlock(s) = &synced.payload else {
            panic!("expected synced block");
        };
        assert_eq!(s.synced_from.as_deref(), Some("source-block"));
    }

    #[tokio::test]
    async fn malformed_payload_is_not_fatal() {
        let raw: RawBlock = serde_json::from_value(serde_json::json!({
            "id": "bad", "type": "paragraph", "has_children": false,
            "paragraph": { "rich_text": "not an array" }
        }))
        .unwrap();
        let block = Normalizer::new(NoProbe).normalize(&raw).await;
        assert_eq!(block.payload, BlockPayload::Unsupported);
        assert_eq!(block.block_type, "paragraph");
    }

    #[test]
    fn table_row_cells() {
        let raws = load_fixture("blocks.json");
        let row = table_row(find(&raws, "row-1"));
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.cells[1].rich_texts[0].plain_text, "B");
    }

    #[tokio::test]
    async fn custom_builder_registration() {
        fn divider(_v: &Value) -> BuildResult {
            Ok(BlockPayload::Embed(Embed { url: "divider".into() }))
        }

        let mut normalizer = Normalizer::new(NoProbe);
        assert!(!normalizer.supports("divider"));
        normalizer.register("divider", divider);

        let raw: RawBlock = serde_json::from_value(serde_json::json!({
            "id": "d", "type": "divider", "has_children": false, "divider": {}
        }))
        .unwrap();
        let block = normalizer.normalize(&raw).await;
        assert!(matches!(block.payload, BlockPayload::Embed(_)));
    }
}
