//! Link preview support: fetch pages and read their OpenGraph metadata.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const USER_AGENT: &str = concat!("blockfeed/", env!("CARGO_PKG_VERSION"));

/// Preview data for a bookmark or link-preview block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

/// Fetch every URL concurrently and map it to its HTML body.
///
/// Each request is bounded by `timeout`. URLs that fail, time out, return a
/// non-success status, or have an empty body are left out.
#[instrument(skip_all, fields(urls = urls.len()))]
pub async fn build_url_to_html_map(urls: &[String], timeout: Duration) -> HashMap<String, String> {
    let client = match Client::builder().user_agent(USER_AGENT).timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build HTTP client for link previews");
            return HashMap::new();
        }
    };

    let fetched = join_all(urls.iter().map(|url| {
        let client = &client;
        async move {
            let body = tokio::time::timeout(timeout, fetch_html(client, url)).await;
            match body {
                Ok(Some(html)) if !html.trim().is_empty() => Some((url.clone(), html)),
                Ok(_) => None,
                Err(_) => {
                    debug!(%url, "link preview timed out");
                    None
                }
            }
        }
    }))
    .await;

    fetched.into_iter().flatten().collect()
}

async fn fetch_html(client: &Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(%url, error = %e, "link preview request failed");
            return None;
        }
    };
    if !response.status().is_success() {
        debug!(%url, status = %response.status(), "link preview returned an error status");
        return None;
    }
    response.text().await.ok()
}

/// Read OpenGraph tags, falling back to `<title>` and the description meta tag.
pub fn link_metadata(html: &str) -> LinkMetadata {
    let document = Html::parse_document(html);

    LinkMetadata {
        title: meta_content(&document, r#"meta[property="og:title"]"#)
            .or_else(|| element_text(&document, "title")),
        description: meta_content(&document, r#"meta[property="og:description"]"#)
            .or_else(|| meta_content(&document, r#"meta[name="description"]"#)),
        image: meta_content(&document, r#"meta[property="og:image"]"#),
        site_name: meta_content(&document, r#"meta[property="og:site_name"]"#),
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn element_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let text = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
