//! Process-lifetime memoization of the post list and database record.
//!
//! Each value is loaded at most once. Concurrent first callers share one
//! load; a failed load leaves the slot empty so a later call retries.

use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use blockfeed_assets::Downloader;
use blockfeed_client::{
    Assembler, ContentApi, RawPage, build_database, build_post, by_slug, is_valid_page, page_slug,
};
use blockfeed_shared::{Block, Database, DimensionProbe, FileKind, Post, Result};

pub struct ContentCache<A, P> {
    assembler: Assembler<A, P>,
    downloader: Downloader,
    posts: OnceCell<Vec<Post>>,
    database: OnceCell<Database>,
}

impl<A: ContentApi, P: DimensionProbe> ContentCache<A, P> {
    pub fn new(assembler: Assembler<A, P>, downloader: Downloader) -> Self {
        Self {
            assembler,
            downloader,
            posts: OnceCell::new(),
            database: OnceCell::new(),
        }
    }

    pub fn assembler(&self) -> &Assembler<A, P> {
        &self.assembler
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// All valid posts, in query order.
    pub async fn posts(&self) -> Result<&[Post]> {
        let posts = self.posts.get_or_try_init(|| self.load_posts()).await?;
        Ok(posts)
    }

    pub async fn database(&self) -> Result<&Database> {
        self.database.get_or_try_init(|| self.load_database()).await
    }

    pub async fn post_by_slug(&self, slug: &str) -> Result<Option<&Post>> {
        Ok(by_slug(self.posts().await?, slug))
    }

    /// Assembled block tree under a page. Not memoized.
    pub async fn blocks(&self, page_id: &str) -> Result<Vec<Block>> {
        self.assembler.assemble_children(page_id).await
    }

    #[instrument(skip_all)]
    async fn load_posts(&self) -> Result<Vec<Post>> {
        let pages = self.assembler.fetch().all_pages().await?;
        info!(pages = pages.len(), "queried pages");

        self.download_page_icons(&pages).await;

        let probe = self.assembler.normalizer().probe();
        let posts = join_all(
            pages
                .iter()
                .filter(|page| is_valid_page(page))
                .map(|page| build_post(page, probe)),
        )
        .await;

        let dropped = pages.len() - posts.len();
        if dropped > 0 {
            debug!(dropped, "pages without title, slug, or date left out");
        }
        Ok(posts)
    }

    #[instrument(skip_all)]
    async fn load_database(&self) -> Result<Database> {
        let raw = self.assembler.fetch().database().await?;
        let database = build_database(&raw);
        info!(title = %database.title, "loaded database");
        Ok(database)
    }

    /// Hosted page icons are saved as `<slug>-icon`; failures are only logged.
    async fn download_page_icons(&self, pages: &[RawPage]) {
        let jobs: Vec<(String, Option<String>)> = pages
            .iter()
            .filter_map(|page| {
                let icon = page.icon.as_ref()?.to_file_object()?;
                (icon.kind == FileKind::File).then(|| (icon.url, page_slug(page)))
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        let outcomes = join_all(jobs.iter().map(|(url, slug)| {
            let index = slug.as_ref().map(|_| "icon");
            self.downloader.download(url, slug.as_deref(), index)
        }))
        .await;
        let saved = outcomes.iter().filter(|o| o.is_saved()).count();
        debug!(icons = jobs.len(), saved, "page icons downloaded");
    }
}
