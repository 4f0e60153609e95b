//! End-to-end ingest: database + posts → block trees → local assets → link previews.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::future::try_join_all;
use futures::stream;
use serde::Serialize;
use tracing::{info, instrument};

use blockfeed_assets::{DownloadOutcome, SavedAsset};
use blockfeed_client::ContentApi;
use blockfeed_shared::{
    Block, BlockfeedError, Database, DimensionProbe, FileKind, Icon, Post, Result,
};

use crate::cache::ContentCache;
use crate::html::{LinkMetadata, build_url_to_html_map, link_metadata};
use crate::tree::{block_source, extract_target_blocks, link_urls};

/// Knobs for [`ingest`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Fetch bookmark and link-preview targets for their metadata.
    pub link_previews: bool,
    /// Per-request bound for link preview fetches.
    pub link_timeout: Duration,
    /// Maximum downloads in flight.
    pub concurrency: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            link_previews: true,
            link_timeout: Duration::from_secs(10),
            concurrency: 8,
        }
    }
}

/// Block tree of one post.
#[derive(Debug, Clone, Serialize)]
pub struct PostBlocks {
    pub slug: String,
    pub page_id: String,
    pub blocks: Vec<Block>,
}

/// Counters of one ingest run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub posts: usize,
    pub blocks: usize,
    /// Downloads that produced a file, fallbacks included.
    pub assets_saved: usize,
    /// Images saved as a plain file after processing failed.
    pub assets_fallback: usize,
    pub assets_skipped: usize,
    pub links: usize,
    pub elapsed: Duration,
}

/// Everything an ingest run produced.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub database: Database,
    pub posts: Vec<Post>,
    pub pages: Vec<PostBlocks>,
    pub links: BTreeMap<String, LinkMetadata>,
    pub report: IngestReport,
}

/// One remote file to mirror locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetJob {
    pub url: String,
    pub slug: Option<String>,
    pub index: Option<String>,
}

impl AssetJob {
    fn named(url: &str, slug: &str, index: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            slug: Some(slug.to_string()),
            index: Some(index.into()),
        }
    }

    fn original(url: &str) -> Self {
        Self {
            url: url.to_string(),
            slug: None,
            index: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Callback trait for ingest progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the asset job list is known.
    fn assets_planned(&self, total: usize);
    /// Called after each download attempt.
    fn asset_done(&self, url: &str, outcome: &DownloadOutcome, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn assets_planned(&self, _total: usize) {}
    fn asset_done(&self, _url: &str, _outcome: &DownloadOutcome, _current: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run a full ingest.
///
/// 1. Database record and post list (memoized in `cache`)
/// 2. Block trees of every post
/// 3. Asset downloads; failures are counted, never fatal
/// 4. Link preview metadata, when enabled
#[instrument(skip_all)]
pub async fn ingest<A: ContentApi, P: DimensionProbe>(
    cache: &ContentCache<A, P>,
    options: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<Ingested> {
    let start = Instant::now();
    info!("starting ingest");

    // --- Phase 1: Database and posts ---
    progress.phase("Loading database");
    let database = cache.database().await?.clone();
    progress.phase("Loading posts");
    let posts = cache.posts().await?.to_vec();

    // --- Phase 2: Block trees ---
    progress.phase("Assembling block trees");
    let pages = try_join_all(posts.iter().map(|post| async move {
        let blocks = cache.blocks(&post.page_id).await?;
        Ok::<_, BlockfeedError>(PostBlocks {
            slug: post.slug.clone(),
            page_id: post.page_id.clone(),
            blocks,
        })
    }))
    .await?;
    let block_count: usize = pages
        .iter()
        .map(|page| {
            let mut n = 0;
            for block in &page.blocks {
                block.walk(&mut |_| n += 1);
            }
            n
        })
        .sum();
    info!(posts = posts.len(), blocks = block_count, "block trees assembled");

    // --- Phase 3: Assets ---
    progress.phase("Downloading assets");
    let jobs = asset_jobs(&database, &posts, &pages);
    progress.assets_planned(jobs.len());
    let outcomes = download_all(cache, &jobs, options.concurrency, progress).await;

    let mut report = IngestReport {
        posts: posts.len(),
        blocks: block_count,
        ..Default::default()
    };
    for outcome in &outcomes {
        match outcome {
            DownloadOutcome::Saved(SavedAsset::Single { fallback: true, .. }) => {
                report.assets_saved += 1;
                report.assets_fallback += 1;
            }
            DownloadOutcome::Saved(_) => report.assets_saved += 1,
            DownloadOutcome::Skipped { .. } => report.assets_skipped += 1,
        }
    }
    info!(
        saved = report.assets_saved,
        fallback = report.assets_fallback,
        skipped = report.assets_skipped,
        "assets downloaded"
    );

    // --- Phase 4: Link previews ---
    let mut links = BTreeMap::new();
    if options.link_previews {
        progress.phase("Fetching link previews");
        let urls: Vec<String> = {
            let mut seen = HashSet::new();
            pages
                .iter()
                .flat_map(|page| link_urls(&page.blocks))
                .filter(|url| seen.insert(url.clone()))
                .collect()
        };
        let html = build_url_to_html_map(&urls, options.link_timeout).await;
        links = html
            .iter()
            .map(|(url, body)| (url.clone(), link_metadata(body)))
            .collect();
        info!(requested = urls.len(), fetched = links.len(), "link previews fetched");
    }
    report.links = links.len();
    report.elapsed = start.elapsed();

    progress.done(&report);
    info!(
        posts = report.posts,
        assets_saved = report.assets_saved,
        elapsed_ms = report.elapsed.as_millis(),
        "ingest complete"
    );

    Ok(Ingested {
        database,
        posts,
        pages,
        links,
        report,
    })
}

/// Download every job with at most `concurrency` in flight.
async fn download_all<A: ContentApi, P: DimensionProbe>(
    cache: &ContentCache<A, P>,
    jobs: &[AssetJob],
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Vec<DownloadOutcome> {
    let completed = AtomicUsize::new(0);
    let total = jobs.len();

    stream::iter(jobs)
        .map(|job| {
            let completed = &completed;
            async move {
                let outcome = cache
                    .downloader()
                    .download(&job.url, job.slug.as_deref(), job.index.as_deref())
                    .await;
                let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.asset_done(&job.url, &outcome, current, total);
                outcome
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Remote files referenced by the database, the posts, and their blocks.
///
/// - database cover (hosted only): original name
/// - site icon (hosted only): `site-icon`
/// - featured image: `<slug>-featured`
/// - image blocks: `<slug>-<n>`, `n` counting image blocks in document order
/// - file blocks: original name
///
/// Duplicate jobs are dropped, first occurrence wins.
pub fn asset_jobs(database: &Database, posts: &[Post], pages: &[PostBlocks]) -> Vec<AssetJob> {
    let mut jobs = Vec::new();

    if let Some(cover) = database.cover.as_ref().filter(|c| c.kind == FileKind::File) {
        jobs.push(AssetJob::original(&cover.url));
    }
    if let Some(Icon::File(icon)) = &database.icon {
        if icon.kind == FileKind::File {
            jobs.push(AssetJob::named(&icon.url, "site", "icon"));
        }
    }

    for post in posts {
        if let Some(featured) = &post.featured_image {
            jobs.push(AssetJob::named(&featured.url, &post.slug, "featured"));
        }
    }

    for page in pages {
        for (n, block) in extract_target_blocks("image", &page.blocks).into_iter().enumerate() {
            if let Some(source) = block_source(block) {
                jobs.push(AssetJob::named(&source.url, &page.slug, n.to_string()));
            }
        }
        for block in extract_target_blocks("file", &page.blocks) {
            if let Some(source) = block_source(block) {
                jobs.push(AssetJob::original(&source.url));
            }
        }
    }

    let mut seen = HashSet::new();
    jobs.retain(|job| seen.insert(job.clone()));
    jobs
}
