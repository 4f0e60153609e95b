//! HTTP-backed [`DimensionProbe`].

use std::io::Cursor;
use std::time::Duration;

use image::ImageReader;
use reqwest::Client;
use tracing::{debug, warn};

use blockfeed_shared::{BlockfeedError, DimensionProbe, ImageDimensions, Result};

const USER_AGENT: &str = concat!("blockfeed/", env!("CARGO_PKG_VERSION"));

/// Fetches an image and reads its header for width and height.
#[derive(Debug, Clone)]
pub struct HttpDimensionProbe {
    client: Client,
}

impl HttpDimensionProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BlockfeedError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn try_dimensions(&self, url: &str) -> Result<(u32, u32)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlockfeedError::api(status.as_u16(), format!("{url}: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: failed to read body: {e}")))?;

        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BlockfeedError::Image(format!("{url}: {e}")))?
            .into_dimensions()
            .map_err(|e| BlockfeedError::Image(format!("{url}: {e}")))
    }
}

impl DimensionProbe for HttpDimensionProbe {
    async fn dimensions(&self, url: &str) -> ImageDimensions {
        match self.try_dimensions(url).await {
            Ok((width, height)) => {
                debug!(%url, width, height, "probed image");
                ImageDimensions {
                    width: Some(width),
                    height: Some(height),
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "image dimension lookup failed");
                ImageDimensions::default()
            }
        }
    }
}
