//! Queries over assembled block trees.

use blockfeed_shared::{Block, BlockPayload, FileObject};

/// Every block of type `block_type` in document order, at any depth.
///
/// Descends through nested children, columns, and synced-block content.
pub fn extract_target_blocks<'a>(block_type: &str, blocks: &'a [Block]) -> Vec<&'a Block> {
    let mut found = Vec::new();
    for block in blocks {
        block.walk(&mut |b| {
            if b.block_type == block_type {
                found.push(b);
            }
        });
    }
    found
}

/// Source file of an image, video, or file block.
pub fn block_source(block: &Block) -> Option<&FileObject> {
    match &block.payload {
        BlockPayload::Image(image) => image.source.as_ref(),
        BlockPayload::File(media) | BlockPayload::Video(media) => media.source.as_ref(),
        _ => None,
    }
}

/// Bookmark and link-preview targets, first occurrence order, no duplicates.
pub fn link_urls(blocks: &[Block]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for block in blocks {
        block.walk(&mut |b| {
            let url = match &b.payload {
                BlockPayload::Bookmark(bookmark) => &bookmark.url,
                BlockPayload::LinkPreview(preview) => &preview.url,
                _ => return,
            };
            if !url.is_empty() && !urls.contains(url) {
                urls.push(url.clone());
            }
        });
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfeed_shared::{
        Bookmark, Column, ColumnList, FileKind, ImageBlock, LinkPreview, SyncedBlock, TextBlock,
    };

    fn block(id: &str, block_type: &str, payload: BlockPayload) -> Block {
        Block {
            id: id.into(),
            block_type: block_type.into(),
            has_children: false,
            payload,
        }
    }

    fn image(id: &str, url: &str) -> Block {
        block(
            id,
            "image",
            BlockPayload::Image(ImageBlock {
                source: Some(FileObject::new(FileKind::File, url)),
                ..Default::default()
            }),
        )
    }

    fn toggle(id: &str, children: Vec<Block>) -> Block {
        block(
            id,
            "toggle",
            BlockPayload::Toggle(TextBlock {
                children,
                ..Default::default()
            }),
        )
    }

    fn tree() -> Vec<Block> {
        vec![
            image("a", "https://f.test/d1/a.png"),
            toggle("t", vec![image("b", "https://f.test/d2/b.png")]),
            block(
                "cols",
                "column_list",
                BlockPayload::ColumnList(ColumnList {
                    columns: vec![
                        Column {
                            id: "c1".into(),
                            has_children: true,
                            children: vec![image("c", "https://f.test/d3/c.png")],
                        },
                        Column {
                            id: "c2".into(),
                            has_children: true,
                            children: vec![block(
                                "bm",
                                "bookmark",
                                BlockPayload::Bookmark(Bookmark {
                                    url: "https://site.test/".into(),
                                    ..Default::default()
                                }),
                            )],
                        },
                    ],
                }),
            ),
            block(
                "s",
                "synced_block",
                BlockPayload::SyncedBlock(SyncedBlock {
                    synced_from: Some("orig".into()),
                    children: vec![
                        image("d", "https://f.test/d4/d.png"),
                        block(
                            "lp",
                            "link_preview",
                            BlockPayload::LinkPreview(LinkPreview {
                                url: "https://site.test/".into(),
                            }),
                        ),
                    ],
                }),
            ),
        ]
    }

    #[test]
    fn finds_images_at_every_depth_in_order() {
        let blocks = tree();
        let ids: Vec<&str> = extract_target_blocks("image", &blocks)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
    }

    #[test]
    fn matching_blocks_are_still_descended() {
        let blocks = vec![toggle("outer", vec![toggle("inner", vec![])])];
        assert_eq!(extract_target_blocks("toggle", &blocks).len(), 2);
        assert!(extract_target_blocks("image", &blocks).is_empty());
    }

    #[test]
    fn sources_and_links() {
        let blocks = tree();
        assert_eq!(block_source(&blocks[0]).unwrap().url, "https://f.test/d1/a.png");
        assert!(block_source(&blocks[1]).is_none());
        assert_eq!(link_urls(&blocks), ["https://site.test/"]);
    }
}
