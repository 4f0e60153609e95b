//! Retry, throttling, and pagination around a [`ContentApi`].
//!
//! Every remote call goes through [`with_retry`]: client errors (4xx) bail
//! immediately, anything else is retried up to the policy's budget. Listing
//! calls additionally go through [`paginate`], the single cursor loop shared by
//! post queries, block children, table rows, and columns.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use blockfeed_shared::{FetchConfig, Result};

use crate::api::ContentApi;
use crate::raw::{Page, RawBlock, RawDatabase, RawPage};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Fixed-budget retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Multiplier applied per further retry.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            min_delay: Duration::from_secs(1),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately (tests, snapshots).
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            min_delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.min_delay * self.factor.saturating_pow(retry.saturating_sub(1))
    }
}

/// Run `op`, retrying retryable failures up to `policy.retries` times.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                debug!(op = op_name, error = %e, "non-retryable failure, bailing");
                return Err(e);
            }
            Err(e) if retry >= policy.retries => {
                warn!(op = op_name, attempts = retry + 1, error = %e, "retry budget exhausted");
                return Err(e);
            }
            Err(e) => {
                retry += 1;
                let delay = policy.delay_for(retry);
                warn!(op = op_name, retry, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Follow `next_cursor` until `has_more` is false, concatenating results in order.
pub async fn paginate<T, F, Fut>(policy: &RetryPolicy, op_name: &str, fetch: F) -> Result<Vec<T>>
where
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = with_retry(policy, op_name, || fetch(cursor.clone())).await?;
        results.extend(page.results);

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!(op = op_name, "has_more set without next_cursor, stopping");
                break;
            }
        }
    }

    Ok(results)
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Enforces a minimum gap between consecutive calls.
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot {
            tokio::time::sleep_until(slot).await;
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}

// ---------------------------------------------------------------------------
// FetchClient
// ---------------------------------------------------------------------------

/// Rate-limited, retrying client over a [`ContentApi`].
#[derive(Debug)]
pub struct FetchClient<A> {
    api: A,
    retry: RetryPolicy,
    throttle: Throttle,
}

impl<A: ContentApi> FetchClient<A> {
    /// Wrap `api` with the given retry policy and no throttling.
    pub fn new(api: A, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            throttle: Throttle::new(Duration::ZERO),
        }
    }

    /// Wrap `api` using the retry and rate-limit settings from `config`.
    pub fn from_config(api: A, config: &FetchConfig) -> Self {
        let retry = RetryPolicy {
            retries: config.retries,
            min_delay: config.retry_min_delay,
            factor: 2,
        };
        Self::new(api, retry).with_rate_limit(config.rate_limit)
    }

    /// Require at least `interval` between two API calls.
    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.throttle = Throttle::new(interval);
        self
    }

    /// The underlying API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Every page record matched by the post query.
    pub async fn all_pages(&self) -> Result<Vec<RawPage>> {
        paginate(&self.retry, "query_pages", |cursor| async move {
            self.throttle.wait().await;
            self.api.query_pages(cursor).await
        })
        .await
    }

    /// Every direct child record of `block_id`.
    pub async fn all_children(&self, block_id: &str) -> Result<Vec<RawBlock>> {
        paginate(&self.retry, "list_children", |cursor| async move {
            self.throttle.wait().await;
            self.api.list_children(block_id, cursor).await
        })
        .await
    }

    /// A single block record.
    pub async fn block(&self, block_id: &str) -> Result<RawBlock> {
        with_retry(&self.retry, "retrieve_block", || async move {
            self.throttle.wait().await;
            self.api.retrieve_block(block_id).await
        })
        .await
    }

    /// The database record.
    pub async fn database(&self) -> Result<RawDatabase> {
        with_retry(&self.retry, "retrieve_database", || async move {
            self.throttle.wait().await;
            self.api.retrieve_database().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use blockfeed_shared::BlockfeedError;

    use crate::api::NotionApi;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            retries: 3,
            min_delay: Duration::from_millis(100),
            factor: 2,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn client_error_is_attempted_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&RetryPolicy::immediate(2), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BlockfeedError::api(404, "not found"))
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_exhausts_budget() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&RetryPolicy::immediate(2), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BlockfeedError::api(500, "boom"))
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_retry(&RetryPolicy::immediate(2), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BlockfeedError::Network("connection reset".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn paginate_stops_without_cursor() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let results = paginate(&RetryPolicy::immediate(0), "test", |_cursor| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Page {
                results: vec![1],
                has_more: true,
                next_cursor: None,
            })
        })
        .await
        .unwrap();

        assert_eq!(results, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // -----------------------------------------------------------------------
    // Against a mock server
    // -----------------------------------------------------------------------

    fn client_for(server: &wiremock::MockServer) -> FetchClient<NotionApi> {
        let config = FetchConfig {
            api_base: server.uri(),
            api_version: "2022-06-28".into(),
            token: "secret_test".into(),
            database_id: "db1".into(),
            retries: 2,
            retry_min_delay: Duration::ZERO,
            rate_limit: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            page_size: 2,
            snapshot_dir: None,
            utc_offset_hours: 9,
            fast_mode: true,
        };
        FetchClient::from_config(NotionApi::new(&config).unwrap(), &config)
    }

    fn child(id: &str) -> serde_json::Value {
        serde_json::json!({ "id": id, "type": "divider", "has_children": false, "divider": {} })
    }

    #[tokio::test]
    async fn three_pages_are_concatenated_in_order() {
        use wiremock::matchers::{method, path, query_param, query_param_is_missing};
        use wiremock::{Mock, ResponseTemplate};

        let server = wiremock::MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/blocks/root/children"))
            .and(query_param_is_missing("start_cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [child("a"), child("b")], "has_more": true, "next_cursor": "c1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/blocks/root/children"))
            .and(query_param("start_cursor", "c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [child("c"), child("d")], "has_more": true, "next_cursor": "c2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/blocks/root/children"))
            .and(query_param("start_cursor", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [child("e")], "has_more": false, "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let children = client.all_children("root").await.unwrap();
        let ids: Vec<&str> = children.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        // `expect(1)` on each mock is verified when the server drops.
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/blocks/gone/children"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.all_children("gone").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn server_error_is_retried_to_budget() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/blocks/flaky"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.block("flaky").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
