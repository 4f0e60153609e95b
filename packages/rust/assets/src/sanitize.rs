//! Path-segment sanitizing and the URL → local name scheme.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use blockfeed_shared::{BlockfeedError, Result};

/// Extensions that take the transcoding path.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Extension of every re-encoded variant.
pub const VARIANT_EXTENSION: &str = "webp";

/// Strip traversal sequences, path separators, and control characters.
///
/// Separators and control characters go first so that removing them cannot
/// splice a new `..` together; `..` is then removed until none is left.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out: String = segment
        .chars()
        .filter(|c| !matches!(c, '/' | '\\') && !c.is_ascii_control())
        .collect();
    while out.contains("..") {
        out = out.replace("..", "");
    }
    out
}

/// The last two path segments of a remote asset URL, decoded and sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    /// Directory token (second-to-last segment).
    pub dir: String,
    /// Original filename (last segment).
    pub file_name: String,
}

impl AssetLocation {
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| BlockfeedError::validation(format!("{raw}: {e}")))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();

        let [.., dir, file] = segments.as_slice() else {
            return Err(BlockfeedError::validation(format!(
                "{raw}: expected at least two path segments"
            )));
        };

        let dir = sanitize_segment(&percent_decode_str(dir).decode_utf8_lossy());
        let file_name = sanitize_segment(&percent_decode_str(file).decode_utf8_lossy());
        if dir.is_empty() || file_name.is_empty() {
            return Err(BlockfeedError::validation(format!(
                "{raw}: empty directory or filename after sanitizing"
            )));
        }

        Ok(Self { dir, file_name })
    }

    /// Text after the last `.`, or empty.
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map_or("", |(_, ext)| ext)
    }

    /// Filename without its extension.
    pub fn stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map_or(self.file_name.as_str(), |(stem, _)| stem)
    }

    pub fn is_image(&self) -> bool {
        let ext = self.extension().to_ascii_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str())
    }

    /// Base name for output files: `slug-index` when both are given, else the original stem.
    pub fn base_name(&self, slug: Option<&str>, index: Option<&str>) -> String {
        match (slug, index) {
            (Some(slug), Some(index)) => sanitize_segment(&format!("{slug}-{index}")),
            _ => self.stem().to_string(),
        }
    }
}

/// Original output plus the three re-encoded variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths<P = PathBuf> {
    pub original: P,
    pub large: P,
    pub medium: P,
    pub small: P,
}

impl AssetPaths<PathBuf> {
    /// Paths under `dir` for base name `base` and original extension `ext`.
    pub fn derive(dir: &Path, base: &str, ext: &str) -> Self {
        Self {
            original: dir.join(with_extension(base, ext)),
            large: dir.join(format!("{base}.{VARIANT_EXTENSION}")),
            medium: dir.join(format!("{base}-md.{VARIANT_EXTENSION}")),
            small: dir.join(format!("{base}-sm.{VARIANT_EXTENSION}")),
        }
    }
}

pub(crate) fn with_extension(base: &str, ext: &str) -> String {
    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{base}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_traversal_and_separators() {
        assert_eq!(sanitize_segment("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_segment("a\\b\u{0}c\u{7f}"), "abc");
        // Removing `/` must not leave a fresh `..` behind.
        assert_eq!(sanitize_segment("./."), "");
        assert_eq!(sanitize_segment("...."), "");
        assert_eq!(sanitize_segment("photo.final.png"), "photo.final.png");
    }

    #[test]
    fn location_from_url() {
        let loc =
            AssetLocation::from_url("https://files.test/secure/abc123/My%20Photo.PNG?sig=1").unwrap();
        assert_eq!(loc.dir, "abc123");
        assert_eq!(loc.file_name, "My Photo.PNG");
        assert_eq!(loc.extension(), "PNG");
        assert_eq!(loc.stem(), "My Photo");
        assert!(loc.is_image());
    }

    #[test]
    fn encoded_traversal_is_neutralized() {
        let loc = AssetLocation::from_url("https://files.test/x/dir/..%2F..%2Fsecret.txt").unwrap();
        assert_eq!(loc.file_name, "secret.txt");
        assert!(!loc.is_image());

        assert!(AssetLocation::from_url("https://files.test/..%2F/a.png").is_err());
        assert!(AssetLocation::from_url("https://files.test/a.png").is_err());
    }

    #[test]
    fn base_name_and_paths() {
        let loc = AssetLocation::from_url("https://files.test/d/photo.jpeg").unwrap();
        assert_eq!(loc.base_name(Some("post"), Some("2")), "post-2");
        assert_eq!(loc.base_name(Some("post"), None), "photo");

        let paths = AssetPaths::derive(Path::new("out/d"), "post-2", "jpeg");
        assert_eq!(paths.original, Path::new("out/d/post-2.jpeg"));
        assert_eq!(paths.large, Path::new("out/d/post-2.webp"));
        assert_eq!(paths.medium, Path::new("out/d/post-2-md.webp"));
        assert_eq!(paths.small, Path::new("out/d/post-2-sm.webp"));
    }

    proptest! {
        #[test]
        fn sanitized_output_is_safe(input in any::<String>()) {
            let out = sanitize_segment(&input);
            prop_assert!(!out.contains(".."));
            prop_assert!(!out.contains('/'));
            prop_assert!(!out.contains('\\'));
            prop_assert!(!out.bytes().any(|b| b < 0x20 || b == 0x7f));
        }

        #[test]
        fn sanitizing_is_idempotent(input in "[a-z./\\\\\\x00-\\x1f]{0,24}") {
            let once = sanitize_segment(&input);
            prop_assert_eq!(sanitize_segment(&once), once);
        }
    }
}
