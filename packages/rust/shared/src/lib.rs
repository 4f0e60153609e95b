//! Shared types, error model, and configuration for blockfeed.
//!
//! This crate is the foundation depended on by all other blockfeed crates.
//! It provides:
//! - [`BlockfeedError`] — the unified error type
//! - Domain types ([`Post`], [`Database`], [`Block`], [`RichText`], [`FileObject`])
//! - The [`DimensionProbe`] seam used by the normalizer
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`AssetConfig`], config loading)

pub mod block;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use block::{
    Annotation, Block, BlockPayload, Bookmark, Callout, Code, Column, ColumnList, Embed, Equation,
    Heading, ImageBlock, LinkPreview, LinkToPage, MediaBlock, RichText, RichTextKind, SyncedBlock,
    Table, TableCell, TableOfContents, TableRow, TextBlock, ToDo, plain_text,
};
pub use config::{
    AppConfig, AssetConfig, AssetsSection, BuildSection, FetchConfig, FetchSection, NotionConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{BlockfeedError, Result};
pub use types::{
    Database, DimensionProbe, FileKind, FileObject, Icon, ImageDimensions, NoProbe, Post,
    SelectProperty,
};
