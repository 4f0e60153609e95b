//! Recursive block-tree assembly.
//!
//! Children are fetched through the paginated primitive, normalized, and then
//! extended according to a per-type [`ChildStrategy`]. Sibling order is the
//! source order: each subtree is awaited in place before the next sibling is
//! processed, and column subtrees are joined back by index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tracing::{debug, instrument, warn};

use blockfeed_shared::{Block, BlockPayload, BlockfeedError, Column, DimensionProbe, Result};

use crate::api::ContentApi;
use crate::fetch::FetchClient;
use crate::normalize::{Normalizer, table_row};
use crate::raw::RawBlock;

/// How a block's children are resolved after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStrategy {
    /// Children are `table_row` records; cells are attached eagerly.
    TableRows,
    /// Children are `column` records, each with its own subtree.
    Columns,
    /// The block's own children, only when the record declares some.
    OwnChildren,
    /// The subtree of the block named by the synced reference.
    SyncedReference,
}

/// The default type tag → strategy table.
pub fn default_strategies() -> HashMap<&'static str, ChildStrategy> {
    let mut strategies = HashMap::new();
    strategies.insert("table", ChildStrategy::TableRows);
    strategies.insert("column_list", ChildStrategy::Columns);
    strategies.insert("synced_block", ChildStrategy::SyncedReference);
    for tag in [
        "paragraph",
        "heading_1",
        "heading_2",
        "heading_3",
        "bulleted_list_item",
        "numbered_list_item",
        "to_do",
        "toggle",
        "quote",
        "callout",
    ] {
        strategies.insert(tag, ChildStrategy::OwnChildren);
    }
    strategies
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Builds fully materialized block trees from a root block id.
pub struct Assembler<A, P> {
    fetch: FetchClient<A>,
    normalizer: Normalizer<P>,
    strategies: HashMap<&'static str, ChildStrategy>,
    snapshot_dir: Option<PathBuf>,
}

impl<A: ContentApi, P: DimensionProbe> Assembler<A, P> {
    pub fn new(fetch: FetchClient<A>, normalizer: Normalizer<P>) -> Self {
        Self {
            fetch,
            normalizer,
            strategies: default_strategies(),
            snapshot_dir: None,
        }
    }

    /// Read `<dir>/<block_id>.json` instead of calling the API when present.
    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }

    /// Register (or replace) the child strategy for a type tag.
    pub fn register(&mut self, block_type: &'static str, strategy: ChildStrategy) {
        self.strategies.insert(block_type, strategy);
    }

    pub fn fetch(&self) -> &FetchClient<A> {
        &self.fetch
    }

    pub fn normalizer(&self) -> &Normalizer<P> {
        &self.normalizer
    }

    /// The complete child tree of `block_id`.
    #[instrument(skip_all, fields(block_id = %block_id))]
    pub async fn assemble_children(&self, block_id: &str) -> Result<Vec<Block>> {
        let blocks = self.assemble(block_id.to_string(), Vec::new()).await?;
        debug!(count = blocks.len(), "assembled children");
        Ok(blocks)
    }

    /// A single normalized block, without its children.
    pub async fn block(&self, block_id: &str) -> Result<Block> {
        let raw = self.fetch.block(block_id).await?;
        Ok(self.normalizer.normalize(&raw).await)
    }

    /// `ancestors` is the chain of block ids above `block_id`.
    fn assemble(&self, block_id: String, ancestors: Vec<String>) -> BoxFuture<'_, Result<Vec<Block>>> {
        async move {
            let raws = self.child_records(&block_id).await?;

            let mut path = ancestors;
            path.push(block_id);

            let mut blocks = Vec::with_capacity(raws.len());
            for raw in &raws {
                let mut block = self.normalizer.normalize(raw).await;
                self.extend(&mut block, &path).await?;
                blocks.push(block);
            }
            Ok(blocks)
        }
        .boxed()
    }

    async fn extend(&self, block: &mut Block, path: &[String]) -> Result<()> {
        let Some(strategy) = self.strategies.get(block.block_type.as_str()).copied() else {
            return Ok(());
        };

        match strategy {
            ChildStrategy::OwnChildren => {
                if !block.has_children {
                    return Ok(());
                }
                let children = self.assemble(block.id.clone(), path.to_vec()).await?;
                if let Some(slot) = block.children_mut() {
                    *slot = children;
                }
            }

            ChildStrategy::TableRows => {
                let raws = self.child_records(&block.id).await?;
                if let BlockPayload::Table(table) = &mut block.payload {
                    table.rows = raws.iter().map(table_row).collect();
                }
            }

            ChildStrategy::Columns => {
                let raws = self.child_records(&block.id).await?;
                let mut chain = path.to_vec();
                chain.push(block.id.clone());

                let columns = try_join_all(raws.iter().map(|raw| {
                    let chain = chain.clone();
                    async move {
                        let children = self.assemble(raw.id.clone(), chain).await?;
                        Ok::<_, BlockfeedError>(Column {
                            id: raw.id.clone(),
                            has_children: raw.has_children,
                            children,
                        })
                    }
                }))
                .await?;

                if let BlockPayload::ColumnList(list) = &mut block.payload {
                    list.columns = columns;
                }
            }

            ChildStrategy::SyncedReference => {
                let reference = match &block.payload {
                    BlockPayload::SyncedBlock(synced) => synced.synced_from.clone(),
                    _ => None,
                };
                let Some(reference) = reference else {
                    return Ok(());
                };
                if reference == block.id || path.contains(&reference) {
                    warn!(block_id = %block.id, %reference, "synced block references its own ancestor, skipping");
                    return Ok(());
                }

                let mut chain = path.to_vec();
                chain.push(block.id.clone());
                let children = self.assemble(reference, chain).await?;
                if let Some(slot) = block.children_mut() {
                    *slot = children;
                }
            }
        }

        Ok(())
    }

    /// Raw children from the snapshot directory if one covers `block_id`, else from the API.
    async fn child_records(&self, block_id: &str) -> Result<Vec<RawBlock>> {
        if let Some(path) = self.snapshot_path(block_id) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(block_id, path = %path.display(), "reading children from snapshot");
                return read_snapshot(&path).await;
            }
        }
        self.fetch.all_children(block_id).await
    }

    fn snapshot_path(&self, block_id: &str) -> Option<PathBuf> {
        let dir = self.snapshot_dir.as_ref()?;
        let safe = !block_id.is_empty()
            && block_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        safe.then(|| dir.join(format!("{block_id}.json")))
    }
}

async fn read_snapshot(path: &Path) -> Result<Vec<RawBlock>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BlockfeedError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| BlockfeedError::parse(format!("{}: {e}", path.display())))
}
