//! Remote asset download into the local asset tree.
//!
//! A download never fails the caller: every problem is logged and reported as
//! [`DownloadOutcome::Skipped`]. Image payloads go through the transcoder; if
//! that fails the bytes are saved as a single metadata-stripped file instead.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use blockfeed_shared::{AssetConfig, BlockfeedError, Result};

use crate::sanitize::{AssetLocation, AssetPaths};
use crate::strip::{MetadataStripper, strip_metadata};
use crate::transcode::{Transcoded, normalize_orientation, transcode};

/// User-Agent string for asset requests.
const USER_AGENT: &str = concat!("blockfeed/", env!("CARGO_PKG_VERSION"));

/// Where a saved asset ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedAsset {
    /// Transcoded image: original plus three WebP tiers.
    Variants(AssetPaths),
    /// One file. `fallback` is set when an image could not be transcoded.
    Single { path: PathBuf, fallback: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(SavedAsset),
    Skipped { reason: String },
}

impl DownloadOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    /// Path of the original-format output, if anything was written.
    pub fn original_path(&self) -> Option<&Path> {
        match self {
            Self::Saved(SavedAsset::Variants(paths)) => Some(&paths.original),
            Self::Saved(SavedAsset::Single { path, .. }) => Some(path),
            Self::Skipped { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    output_dir: PathBuf,
}

impl Downloader {
    pub fn new(config: &AssetConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BlockfeedError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            output_dir: config.output_dir.clone(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch `url` and store it under `<output_dir>/<dir token>/`.
    ///
    /// With both `slug` and `index` the base name is `<slug>-<index>`, otherwise
    /// the decoded original filename is kept.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn download(&self, url: &str, slug: Option<&str>, index: Option<&str>) -> DownloadOutcome {
        match self.try_download(url, slug, index).await {
            Ok(saved) => DownloadOutcome::Saved(saved),
            Err(e) => {
                warn!(%url, error = %e, "asset download skipped");
                DownloadOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_download(&self, url: &str, slug: Option<&str>, index: Option<&str>) -> Result<SavedAsset> {
        let location = AssetLocation::from_url(url)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(BlockfeedError::api(status.as_u16(), format!("{url}: HTTP {status}")));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let dir = self.output_dir.join(&location.dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BlockfeedError::io(&dir, e))?;

        let base = location.base_name(slug, index);
        let paths = AssetPaths::derive(&dir, &base, location.extension());

        if location.is_image() && content_type.starts_with("image/") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| BlockfeedError::Network(format!("{url}: failed to read body: {e}")))?;
            return save_image(bytes.to_vec(), paths).await;
        }

        save_plain(response, &content_type, &paths.original).await?;
        info!(path = %paths.original.display(), "saved file");
        Ok(SavedAsset::Single {
            path: paths.original,
            fallback: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Save paths
// ---------------------------------------------------------------------------

async fn save_image(bytes: Vec<u8>, paths: AssetPaths) -> Result<SavedAsset> {
    let source = bytes.clone();
    let transcoded = tokio::task::spawn_blocking(move || transcode(&source))
        .await
        .map_err(|e| BlockfeedError::Image(format!("transcoder task failed: {e}")))
        .and_then(|result| result);

    let written = match transcoded {
        Ok(out) => write_variants(&out, &paths).await.map(|()| out),
        Err(e) => Err(e),
    };

    match written {
        Ok(out) => {
            info!(
                path = %paths.original.display(),
                width = out.width,
                height = out.height,
                "saved image variants"
            );
            Ok(SavedAsset::Variants(paths))
        }
        Err(e) => {
            warn!(path = %paths.original.display(), error = %e, "image processing failed, saving as plain file");
            write_file(&paths.original, &strip_metadata(&bytes)).await?;
            Ok(SavedAsset::Single {
                path: paths.original,
                fallback: true,
            })
        }
    }
}

async fn write_variants(out: &Transcoded, paths: &AssetPaths) -> Result<()> {
    write_file(&paths.original, &out.original).await?;
    write_file(&paths.large, &out.large).await?;
    write_file(&paths.medium, &out.medium).await?;
    write_file(&paths.small, &out.small).await?;
    Ok(())
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BlockfeedError::io(path, e))
}

/// Stream the body through the metadata stripper into `path`.
///
/// JPEG content is buffered instead so its orientation can be applied before
/// the Exif block disappears.
async fn save_plain(response: Response, content_type: &str, path: &Path) -> Result<()> {
    if content_type == "image/jpeg" {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BlockfeedError::Network(format!("failed to read body: {e}")))?
            .to_vec();
        let source = bytes.clone();
        let oriented = match tokio::task::spawn_blocking(move || normalize_orientation(&source)).await {
            Ok(Ok(oriented)) => oriented,
            Ok(Err(e)) => {
                debug!(error = %e, "orientation skipped");
                bytes
            }
            Err(e) => {
                debug!(error = %e, "orientation task failed");
                bytes
            }
        };
        return write_file(path, &strip_metadata(&oriented)).await;
    }

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| BlockfeedError::io(path, e))?;
    let mut stripper = MetadataStripper::new();
    let mut stream = response.bytes_stream();
    let mut out = Vec::new();

    while let Some(chunk) = stream.next().await {
        // On error the partial file is closed when `file` drops.
        let chunk = chunk.map_err(|e| BlockfeedError::Network(format!("stream interrupted: {e}")))?;
        out.clear();
        stripper.push(&chunk, &mut out);
        file.write_all(&out).await.map_err(|e| BlockfeedError::io(path, e))?;
    }

    out.clear();
    stripper.finish(&mut out);
    file.write_all(&out).await.map_err(|e| BlockfeedError::io(path, e))?;
    file.flush().await.map_err(|e| BlockfeedError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    use image::{ImageFormat, Rgb, RgbImage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bf-assets-{}", uuid::Uuid::now_v7()))
    }

    fn downloader(output_dir: &Path) -> Downloader {
        Downloader::new(&AssetConfig {
            output_dir: output_dir.to_path_buf(),
            base_path: "/".into(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>, content_type: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, content_type))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn image_gets_all_variants() {
        let server = MockServer::start().await;
        serve(&server, "/secure/dir123/photo.png", png(1200, 600), "image/png").await;
        let out = temp_dir();

        let url = format!("{}/secure/dir123/photo.png", server.uri());
        let outcome = downloader(&out).download(&url, Some("post"), Some("0")).await;

        let DownloadOutcome::Saved(SavedAsset::Variants(paths)) = outcome else {
            panic!("expected variants, got {outcome:?}");
        };
        assert_eq!(paths.original, out.join("dir123/post-0.png"));
        assert_eq!(paths.small, out.join("dir123/post-0-sm.webp"));
        for p in [&paths.original, &paths.large, &paths.medium, &paths.small] {
            assert!(p.exists(), "{} missing", p.display());
        }
        let original = image::open(&paths.original).unwrap();
        assert_eq!(original.width(), 800);

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn repeated_download_is_byte_identical() {
        let server = MockServer::start().await;
        serve(&server, "/s/d1/pic.png", png(500, 500), "image/png").await;
        let out = temp_dir();
        let dl = downloader(&out);
        let url = format!("{}/s/d1/pic.png", server.uri());

        let read_all = |paths: &AssetPaths| {
            [&paths.original, &paths.large, &paths.medium, &paths.small]
                .map(|p| std::fs::read(p).unwrap())
        };

        let DownloadOutcome::Saved(SavedAsset::Variants(first)) = dl.download(&url, Some("a"), Some("1")).await
        else {
            panic!("first download failed");
        };
        let before = read_all(&first);
        let DownloadOutcome::Saved(SavedAsset::Variants(second)) = dl.download(&url, Some("a"), Some("1")).await
        else {
            panic!("second download failed");
        };
        assert_eq!(first, second);
        assert_eq!(before, read_all(&second));

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn undecodable_image_falls_back_to_single_file() {
        let server = MockServer::start().await;
        let body = b"GIF89a but not really".to_vec();
        serve(&server, "/s/d2/broken.gif", body.clone(), "image/gif").await;
        let out = temp_dir();

        let url = format!("{}/s/d2/broken.gif", server.uri());
        let outcome = downloader(&out).download(&url, None, None).await;

        let expected = out.join("d2/broken.gif");
        assert_eq!(
            outcome,
            DownloadOutcome::Saved(SavedAsset::Single {
                path: expected.clone(),
                fallback: true
            })
        );
        assert_eq!(std::fs::read(&expected).unwrap(), body);
        assert!(!out.join("d2/broken.webp").exists());

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn non_image_is_streamed_with_original_name() {
        let server = MockServer::start().await;
        let body = b"%PDF-1.7 hello".to_vec();
        serve(&server, "/s/d3/Annual%20Report.pdf", body.clone(), "application/pdf").await;
        let out = temp_dir();

        let url = format!("{}/s/d3/Annual%20Report.pdf", server.uri());
        let outcome = downloader(&out).download(&url, Some("ignored"), None).await;

        let path = out.join("d3/Annual Report.pdf");
        assert_eq!(outcome.original_path(), Some(path.as_path()));
        assert_eq!(std::fs::read(&path).unwrap(), body);

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn image_extension_with_non_image_type_is_plain() {
        let server = MockServer::start().await;
        serve(&server, "/s/d4/pic.png", png(10, 10), "application/octet-stream").await;
        let out = temp_dir();

        let url = format!("{}/s/d4/pic.png", server.uri());
        let outcome = downloader(&out).download(&url, None, None).await;
        assert!(matches!(
            outcome,
            DownloadOutcome::Saved(SavedAsset::Single { fallback: false, .. })
        ));

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn error_status_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(path("/s/d5/gone.png"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        let out = temp_dir();

        let url = format!("{}/s/d5/gone.png", server.uri());
        let outcome = downloader(&out).download(&url, None, None).await;
        assert!(matches!(outcome, DownloadOutcome::Skipped { .. }));
        assert!(!out.join("d5/gone.png").exists());

        std::fs::remove_dir_all(&out).ok();
    }

    #[tokio::test]
    async fn unusable_url_is_skipped_without_request() {
        let out = temp_dir();
        let outcome = downloader(&out).download("not a url", None, None).await;
        assert!(!outcome.is_saved());
    }
}
