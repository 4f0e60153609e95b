//! Reverse lookup from a remote asset URL to the file the downloader wrote.
//!
//! Nothing is recorded at download time; the local name is re-derived from
//! the directory contents. A directory is expected to hold assets of a single
//! post, so renamed candidates must all share one slug prefix.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

use blockfeed_shared::{AssetConfig, BlockfeedError, Result};

use crate::sanitize::{AssetLocation, AssetPaths, VARIANT_EXTENSION};
use crate::transcode::{LARGE, MEDIUM, SMALL};

/// `-<digits>.`, `-featured.` or `-icon.` right before the extension.
static RENAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.*)-(?:\d+|featured|icon)\.[^.]*$").expect("static pattern")
});

#[derive(Debug, Clone)]
pub struct PathResolver {
    output_dir: PathBuf,
    base_path: String,
}

impl PathResolver {
    pub fn new(config: &AssetConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            base_path: config.base_path.clone(),
        }
    }

    /// Web path of the local copy of `url`.
    ///
    /// Order: the exact original filename, then the first renamed file with the
    /// same extension, then the original filename even though it is missing.
    /// Fails if renamed candidates belong to more than one slug.
    pub fn try_resolve(&self, url: &str) -> Result<String> {
        let location = AssetLocation::from_url(url)?;
        let file = self.local_name(&location)?;
        Ok(self.web_path(&location.dir, &file))
    }

    /// Like [`try_resolve`](Self::try_resolve), but never fails: ambiguity is
    /// logged and the first candidate wins; an unusable URL is returned as-is.
    pub fn resolve(&self, url: &str) -> String {
        let location = match AssetLocation::from_url(url) {
            Ok(location) => location,
            Err(e) => {
                error!(%url, error = %e, "cannot derive a local path");
                return url.to_string();
            }
        };

        let file = match self.local_name(&location) {
            Ok(file) => file,
            Err(e) => {
                error!(%url, error = %e, "ambiguous asset directory");
                self.candidates(&location)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| location.file_name.clone())
            }
        };
        self.web_path(&location.dir, &file)
    }

    /// Web paths of the original and its three WebP tiers.
    pub fn image_paths(&self, url: &str) -> AssetPaths<String> {
        let original = self.resolve(url);
        let stem = original
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.ends_with('/'))
            .map_or(original.as_str(), |(stem, _)| stem)
            .to_string();

        AssetPaths {
            large: format!("{stem}{}.{VARIANT_EXTENSION}", LARGE.suffix),
            medium: format!("{stem}{}.{VARIANT_EXTENSION}", MEDIUM.suffix),
            small: format!("{stem}{}.{VARIANT_EXTENSION}", SMALL.suffix),
            original,
        }
    }

    /// `<base_path>/notion/<dir>/<file>`; a trailing slash on the base is dropped.
    pub fn web_path(&self, dir: &str, file: &str) -> String {
        let base = self.base_path.trim_end_matches('/');
        format!("{base}/notion/{dir}/{file}")
    }

    /// Filesystem path of the local copy of `url`.
    pub fn local_path(&self, url: &str) -> Result<PathBuf> {
        let location = AssetLocation::from_url(url)?;
        let file = self.local_name(&location)?;
        Ok(self.output_dir.join(&location.dir).join(file))
    }

    fn local_name(&self, location: &AssetLocation) -> Result<String> {
        let dir = self.output_dir.join(&location.dir);
        if dir.join(&location.file_name).is_file() {
            return Ok(location.file_name.clone());
        }

        let candidates = self.candidates(location);
        let mut prefixes: Vec<&str> = candidates
            .iter()
            .filter_map(|name| RENAMED.captures(name))
            .filter_map(|caps| caps.name("prefix").map(|m| m.as_str()))
            .collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        if prefixes.len() > 1 {
            return Err(BlockfeedError::validation(format!(
                "{} holds renamed assets of several sources: {}",
                dir.display(),
                candidates.join(", ")
            )));
        }

        Ok(candidates
            .into_iter()
            .next()
            .unwrap_or_else(|| location.file_name.clone()))
    }

    /// Renamed files in the location's directory with the original's extension, sorted.
    fn candidates(&self, location: &AssetLocation) -> Vec<String> {
        let suffix = format!(".{}", location.extension());
        let mut names = list_files(&self.output_dir.join(&location.dir))
            .into_iter()
            .filter(|name| {
                name.ends_with(&suffix) && *name != location.file_name && RENAMED.is_match(name)
            })
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn list_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}

/// `srcset` value listing the three WebP tiers.
pub fn srcset(paths: &AssetPaths<String>) -> String {
    format!(
        "{} {}w, {} {}w, {} {}w",
        paths.small, SMALL.width, paths.medium, MEDIUM.width, paths.large, LARGE.width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver_with(files: &[&str]) -> (PathResolver, PathBuf) {
        let root = std::env::temp_dir().join(format!("bf-resolve-{}", uuid::Uuid::now_v7()));
        let dir = root.join("dir");
        std::fs::create_dir_all(&dir).unwrap();
        for f in files {
            std::fs::write(dir.join(f), b"x").unwrap();
        }
        let resolver = PathResolver::new(&AssetConfig {
            output_dir: root.clone(),
            base_path: "/blog/".into(),
            request_timeout: Duration::from_secs(1),
        });
        (resolver, root)
    }

    const URL: &str = "https://files.test/secure/dir/foo.png?sig=abc";

    #[test]
    fn exact_name_wins() {
        let (r, root) = resolver_with(&["foo.png", "foo-3.png"]);
        assert_eq!(r.resolve(URL), "/blog/notion/dir/foo.png");
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn renamed_file_is_found() {
        let (r, root) = resolver_with(&["foo-3.png", "foo-3.webp", "foo-3-md.webp"]);
        assert_eq!(r.try_resolve(URL).unwrap(), "/blog/notion/dir/foo-3.png");
        assert_eq!(r.local_path(URL).unwrap(), root.join("dir/foo-3.png"));
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn featured_and_icon_names_match() {
        let (r, root) = resolver_with(&["post-featured.png"]);
        assert_eq!(r.resolve(URL), "/blog/notion/dir/post-featured.png");
        std::fs::remove_dir_all(root).ok();

        let (r, root) = resolver_with(&["post-icon.png", "unrelated.png"]);
        assert_eq!(r.resolve(URL), "/blog/notion/dir/post-icon.png");
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_file_falls_back_to_original_name() {
        let (r, root) = resolver_with(&["other.jpg", "post-1.jpg"]);
        assert_eq!(r.resolve(URL), "/blog/notion/dir/foo.png");
        std::fs::remove_dir_all(root).ok();

        let r = PathResolver::new(&AssetConfig {
            output_dir: PathBuf::from("/nonexistent/blockfeed"),
            base_path: "/".into(),
            request_timeout: Duration::from_secs(1),
        });
        assert_eq!(r.resolve(URL), "/notion/dir/foo.png");
    }

    #[test]
    fn several_slugs_are_ambiguous() {
        let (r, root) = resolver_with(&["beta-0.png", "alpha-2.png", "alpha-1.png"]);
        assert!(matches!(r.try_resolve(URL), Err(BlockfeedError::Validation { .. })));
        // Sorted, so the pick is stable.
        assert_eq!(r.resolve(URL), "/blog/notion/dir/alpha-1.png");
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn one_slug_with_several_indices_is_fine() {
        let (r, root) = resolver_with(&["post-1.png", "post-0.png", "post-featured.png"]);
        assert_eq!(r.try_resolve(URL).unwrap(), "/blog/notion/dir/post-0.png");
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn image_paths_and_srcset() {
        let (r, root) = resolver_with(&["foo-3.png"]);
        let paths = r.image_paths(URL);
        assert_eq!(paths.original, "/blog/notion/dir/foo-3.png");
        assert_eq!(paths.large, "/blog/notion/dir/foo-3.webp");
        assert_eq!(paths.medium, "/blog/notion/dir/foo-3-md.webp");
        assert_eq!(
            srcset(&paths),
            "/blog/notion/dir/foo-3-sm.webp 200w, /blog/notion/dir/foo-3-md.webp 400w, /blog/notion/dir/foo-3.webp 800w"
        );
        std::fs::remove_dir_all(root).ok();
    }
}
