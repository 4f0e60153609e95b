//! Ingest orchestration for blockfeed.
//!
//! This crate ties the content client and the asset pipeline together:
//! - [`ContentCache`] — memoized post list and database record
//! - [`ingest`] — block trees, asset downloads, and link previews in one run
//! - [`export`] — JSON snapshot of an ingest run
//! - [`tree`] — queries over assembled block trees
//! - [`html`] — link preview fetching and metadata extraction

pub mod cache;
pub mod export;
pub mod html;
pub mod pipeline;
pub mod tree;

pub use cache::ContentCache;
pub use export::{ExportSummary, export};
pub use html::{LinkMetadata, build_url_to_html_map, link_metadata};
pub use pipeline::{
    AssetJob, IngestOptions, IngestReport, Ingested, PostBlocks, ProgressReporter, SilentProgress,
    asset_jobs, ingest,
};
pub use tree::{block_source, extract_target_blocks, link_urls};
