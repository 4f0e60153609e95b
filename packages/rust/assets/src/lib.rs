//! Local asset tree: download, metadata stripping, transcoding, and path lookup.
//!
//! This crate provides:
//! - [`Downloader`] — fetches a remote file into `<output_dir>/<dir token>/`
//! - [`transcode`] — oriented, width-capped original plus three WebP tiers
//! - [`MetadataStripper`] — streaming APP1 (Exif/XMP) removal
//! - [`PathResolver`] — remote URL → web path of the local (possibly renamed) copy
//! - [`HttpDimensionProbe`] — image width/height lookup for the normalizer

pub mod dimensions;
pub mod download;
pub mod resolve;
pub mod sanitize;
pub mod strip;
pub mod transcode;

pub use dimensions::HttpDimensionProbe;
pub use download::{DownloadOutcome, Downloader, SavedAsset};
pub use resolve::{PathResolver, srcset};
pub use sanitize::{AssetLocation, AssetPaths, IMAGE_EXTENSIONS, sanitize_segment};
pub use strip::{MetadataStripper, strip_metadata};
pub use transcode::{MAX_WIDTH, Transcoded, transcode};
