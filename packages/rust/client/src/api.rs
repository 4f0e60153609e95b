//! Remote content API seam and its HTTP implementation.

use std::future::Future;

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeZone, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use blockfeed_shared::{BlockfeedError, FetchConfig, Result};

use crate::raw::{Page, RawBlock, RawDatabase, RawPage};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("blockfeed/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The four remote operations the ingestion engine needs.
///
/// Implementations report failures as [`BlockfeedError::Api`] when the remote
/// answered with a status, so the retry policy can tell 4xx from the rest.
pub trait ContentApi: Send + Sync {
    /// One page of the filtered, sorted post query.
    fn query_pages(
        &self,
        cursor: Option<String>,
    ) -> impl Future<Output = Result<Page<RawPage>>> + Send;

    /// One page of a block's children.
    fn list_children(
        &self,
        block_id: &str,
        cursor: Option<String>,
    ) -> impl Future<Output = Result<Page<RawBlock>>> + Send;

    /// A single block record.
    fn retrieve_block(&self, block_id: &str) -> impl Future<Output = Result<RawBlock>> + Send;

    /// The database (container) record.
    fn retrieve_database(&self) -> impl Future<Output = Result<RawDatabase>> + Send;
}

// ---------------------------------------------------------------------------
// NotionApi
// ---------------------------------------------------------------------------

/// reqwest-backed [`ContentApi`].
#[derive(Debug, Clone)]
pub struct NotionApi {
    client: Client,
    api_base: String,
    database_id: String,
    page_size: u32,
    utc_offset_hours: i32,
}

impl NotionApi {
    /// Build a client with auth and version headers preset.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| BlockfeedError::config(format!("invalid API token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        let version = HeaderValue::from_str(&config.api_version)
            .map_err(|e| BlockfeedError::config(format!("invalid API version: {e}")))?;
        headers.insert("Notion-Version", version);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BlockfeedError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            database_id: config.database_id.clone(),
            page_size: config.page_size,
            utc_offset_hours: config.utc_offset_hours,
        })
    }

    fn query_body(&self, cursor: Option<String>) -> Value {
        let mut body = json!({
            "filter": publish_filter(Utc::now(), self.utc_offset_hours),
            "sorts": [{ "property": "Date", "direction": "descending" }],
            "page_size": self.page_size,
        });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor);
        }
        body
    }
}

impl ContentApi for NotionApi {
    async fn query_pages(&self, cursor: Option<String>) -> Result<Page<RawPage>> {
        let url = format!("{}/databases/{}/query", self.api_base, self.database_id);
        debug!(%url, ?cursor, "querying pages");
        let response = self
            .client
            .post(&url)
            .json(&self.query_body(cursor))
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        read_json(response, &url).await
    }

    async fn list_children(&self, block_id: &str, cursor: Option<String>) -> Result<Page<RawBlock>> {
        let url = format!("{}/blocks/{block_id}/children", self.api_base);
        debug!(%url, ?cursor, "listing children");
        let mut query = vec![("page_size", self.page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor));
        }
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        read_json(response, &url).await
    }

    async fn retrieve_block(&self, block_id: &str) -> Result<RawBlock> {
        let url = format!("{}/blocks/{block_id}", self.api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        read_json(response, &url).await
    }

    async fn retrieve_database(&self) -> Result<RawDatabase> {
        let url = format!("{}/databases/{}", self.api_base, self.database_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlockfeedError::Network(format!("{url}: {e}")))?;
        read_json(response, &url).await
    }
}

/// Decode a JSON body, turning error statuses into [`BlockfeedError::Api`].
async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BlockfeedError::Network(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        // The API reports `{ "object": "error", "code": ..., "message": ... }`.
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("{url}: HTTP {status}"));
        return Err(BlockfeedError::api(status.as_u16(), message));
    }

    serde_json::from_str(&body).map_err(|e| BlockfeedError::parse(format!("{url}: {e}")))
}

/// Published posts dated on or before the end of "today" in the given UTC offset.
pub fn publish_filter(now: DateTime<Utc>, utc_offset_hours: i32) -> Value {
    json!({
        "and": [
            { "property": "Published", "checkbox": { "equals": true } },
            { "property": "Date", "date": { "on_or_before": end_of_day(now, utc_offset_hours) } },
        ]
    })
}

fn end_of_day(now: DateTime<Utc>, utc_offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    let local_end = now
        .with_timezone(&offset)
        .date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|end| offset.from_local_datetime(&end).single());

    local_end
        .map_or(now, |end| end.with_timezone(&Utc))
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
