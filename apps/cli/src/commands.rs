//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use blockfeed_assets::{
    AssetLocation, DownloadOutcome, Downloader, HttpDimensionProbe, PathResolver, SavedAsset,
    srcset,
};
use blockfeed_client::{
    Assembler, FetchClient, NotionApi, Normalizer, all_tags, blog_posts, page_count,
    page_count_by_tag, page_of, page_of_tag,
};
use blockfeed_core::{
    ContentCache, IngestOptions, IngestReport, ProgressReporter, export, ingest,
};
use blockfeed_shared::{AppConfig, AssetConfig, FetchConfig, init_config, load_config};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// blockfeed — mirror a content database into local JSON and assets.
#[derive(Parser)]
#[command(
    name = "blockfeed",
    version,
    about = "Fetch posts and block trees from the content API and mirror their assets locally.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest everything and write a JSON snapshot.
    Sync {
        /// Directory for posts.json, database.json, links.json, and blocks/.
        #[arg(short, long, default_value = "var/content")]
        out: PathBuf,

        /// Skip fetching bookmark and link-preview targets.
        #[arg(long)]
        no_links: bool,

        /// Maximum asset downloads in flight.
        #[arg(long, default_value = "8")]
        concurrency: usize,
    },

    /// List posts, one page at a time.
    Posts {
        /// Only posts carrying this tag.
        #[arg(long)]
        tag: Option<String>,

        /// 1-based page number.
        #[arg(long, default_value = "1")]
        page: usize,
    },

    /// Print the assembled block tree of a page as JSON.
    Blocks {
        /// Page or block ID.
        id: String,
    },

    /// Download one asset into the output directory.
    Download {
        url: String,

        /// Post slug for the renamed file.
        #[arg(long, requires = "index")]
        slug: Option<String>,

        /// Index or role (`featured`, `icon`) for the renamed file.
        #[arg(long, requires = "slug")]
        index: Option<String>,
    },

    /// Print the web path of a downloaded asset.
    Resolve {
        url: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "blockfeed=info",
        1 => "blockfeed=debug",
        _ => "blockfeed=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync {
            out,
            no_links,
            concurrency,
        } => cmd_sync(out, !no_links, concurrency).await,
        Command::Posts { tag, page } => cmd_posts(tag.as_deref(), page).await,
        Command::Blocks { id } => cmd_blocks(&id).await,
        Command::Download { url, slug, index } => {
            cmd_download(&url, slug.as_deref(), index.as_deref()).await
        }
        Command::Resolve { url } => cmd_resolve(&url),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

type Cache = ContentCache<NotionApi, Option<HttpDimensionProbe>>;

/// Wire the API client, normalizer, assembler, and downloader from config.
///
/// Image dimension lookups are skipped in fast mode.
fn build_cache(config: &AppConfig) -> Result<Cache> {
    let fetch_config = FetchConfig::from_app(config)?;
    let asset_config = AssetConfig::from(config);

    let fetch = FetchClient::from_config(NotionApi::new(&fetch_config)?, &fetch_config);
    let probe = if fetch_config.fast_mode {
        None
    } else {
        Some(HttpDimensionProbe::new(fetch_config.request_timeout)?)
    };
    let assembler = Assembler::new(fetch, Normalizer::new(probe))
        .with_snapshot_dir(fetch_config.snapshot_dir.clone());
    let downloader = Downloader::new(&asset_config)?;

    Ok(ContentCache::new(assembler, downloader))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(out: PathBuf, link_previews: bool, concurrency: usize) -> Result<()> {
    let config = load_config()?;
    let cache = build_cache(&config)?;
    let options = IngestOptions {
        link_previews,
        link_timeout: Duration::from_millis(config.fetch.request_timeout_ms),
        concurrency,
    };

    info!(out = %out.display(), link_previews, concurrency, "starting sync");

    let reporter = CliProgress::new();
    let ingested = ingest(&cache, &options, &reporter).await?;
    let summary = export(&ingested, &out).await?;

    let report = &ingested.report;
    println!();
    println!("  Sync complete!");
    println!("  Posts:   {}", report.posts);
    println!("  Blocks:  {}", report.blocks);
    println!(
        "  Assets:  {} saved ({} as plain files), {} skipped",
        report.assets_saved, report.assets_fallback, report.assets_skipped
    );
    println!("  Links:   {}", report.links);
    println!("  Files:   {} in {}", summary.files.len(), summary.dir.display());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_posts(tag: Option<&str>, page: usize) -> Result<()> {
    let config = load_config()?;
    let per_page = config.build.posts_per_page;
    let cache = build_cache(&config)?;
    let posts = cache.posts().await?;

    let (listed, pages) = match tag {
        Some(tag) => {
            if !all_tags(posts).iter().any(|t| t.name == tag) {
                return Err(eyre!("unknown tag '{tag}'"));
            }
            (page_of_tag(posts, tag, page, per_page), page_count_by_tag(posts, tag, per_page))
        }
        None => (page_of(posts, page, per_page), page_count(posts, per_page)),
    };

    println!();
    for post in &listed {
        println!("  {}  {:<40}  /{}", post.date, post.title, post.slug);
    }
    if listed.is_empty() {
        println!("  (no posts on this page)");
    }
    println!();
    println!(
        "  Page {page}/{pages} · {} posts in blog · {} tags",
        blog_posts(posts).len(),
        all_tags(posts).len()
    );
    println!();

    Ok(())
}

async fn cmd_blocks(id: &str) -> Result<()> {
    let config = load_config()?;
    let cache = build_cache(&config)?;
    let blocks = cache.blocks(id).await?;
    println!("{}", serde_json::to_string_pretty(&blocks)?);
    Ok(())
}

async fn cmd_download(url: &str, slug: Option<&str>, index: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let downloader = Downloader::new(&AssetConfig::from(&config))?;

    match downloader.download(url, slug, index).await {
        DownloadOutcome::Saved(SavedAsset::Variants(paths)) => {
            println!("  Original: {}", paths.original.display());
            println!("  Large:    {}", paths.large.display());
            println!("  Medium:   {}", paths.medium.display());
            println!("  Small:    {}", paths.small.display());
        }
        DownloadOutcome::Saved(SavedAsset::Single { path, fallback }) => {
            let note = if fallback { " (image processing failed)" } else { "" };
            println!("  Saved: {}{note}", path.display());
        }
        DownloadOutcome::Skipped { reason } => {
            return Err(eyre!("download skipped: {reason}"));
        }
    }
    Ok(())
}

fn cmd_resolve(url: &str) -> Result<()> {
    let config = load_config()?;
    let resolver = PathResolver::new(&AssetConfig::from(&config));

    let location = AssetLocation::from_url(url)?;
    if location.is_image() {
        let paths = resolver.image_paths(url);
        println!("  Path:   {}", paths.original);
        println!("  Srcset: {}", srcset(&paths));
    } else {
        println!("  Path: {}", resolver.try_resolve(url)?);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn assets_planned(&self, total: usize) {
        self.spinner.set_message(format!("Downloading {total} assets"));
    }

    fn asset_done(&self, url: &str, outcome: &DownloadOutcome, current: usize, total: usize) {
        let status = if outcome.is_saved() { "saved" } else { "skipped" };
        self.spinner
            .set_message(format!("Assets [{current}/{total}] {status} {url}"));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}
