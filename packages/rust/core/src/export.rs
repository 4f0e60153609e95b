//! JSON snapshot of an ingest run for static site builds.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use blockfeed_assets::sanitize_segment;
use blockfeed_shared::{BlockfeedError, Result};

use crate::pipeline::Ingested;

/// Files written by [`export`].
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Write `posts.json`, `database.json`, `links.json`, and `blocks/<slug>.json`
/// under `dir`, replacing earlier files of the same name.
pub async fn export(ingested: &Ingested, dir: &Path) -> Result<ExportSummary> {
    let blocks_dir = dir.join("blocks");
    tokio::fs::create_dir_all(&blocks_dir)
        .await
        .map_err(|e| BlockfeedError::io(&blocks_dir, e))?;

    let mut files = vec![
        write_json(&dir.join("posts.json"), &ingested.posts).await?,
        write_json(&dir.join("database.json"), &ingested.database).await?,
        write_json(&dir.join("links.json"), &ingested.links).await?,
    ];

    for page in &ingested.pages {
        let name = sanitize_segment(&page.slug);
        if name.is_empty() {
            debug!(page_id = %page.page_id, "slug sanitizes to nothing, blocks not exported");
            continue;
        }
        files.push(write_json(&blocks_dir.join(format!("{name}.json")), &page.blocks).await?);
    }

    info!(dir = %dir.display(), files = files.len(), "export written");
    Ok(ExportSummary {
        dir: dir.to_path_buf(),
        files,
    })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| BlockfeedError::parse(format!("serialize {}: {e}", path.display())))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| BlockfeedError::io(path, e))?;
    Ok(path.to_path_buf())
}
