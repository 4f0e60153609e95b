//! Content API client, block normalization, and tree assembly.
//!
//! This crate provides:
//! - [`api`] — the [`ContentApi`] seam and its reqwest implementation
//! - [`fetch`] — retry/bail policy, throttling, and the pagination loop
//! - [`normalize`] — raw block record → typed [`Block`](blockfeed_shared::Block)
//! - [`assembler`] — recursive child resolution per block type
//! - [`posts`] — page → post building, page validation, listing helpers

pub mod api;
pub mod assembler;
pub mod fetch;
pub mod normalize;
pub mod posts;
pub mod raw;

pub use api::{ContentApi, NotionApi, publish_filter};
pub use assembler::{Assembler, ChildStrategy, default_strategies};
pub use fetch::{FetchClient, RetryPolicy, paginate, with_retry};
pub use normalize::{BlockBuilder, Normalizer, rich_text, table_row};
pub use posts::{
    PROFILE_SLUG, all_tags, blog_posts, build_database, build_post, by_page_id, by_slug, by_tag,
    is_valid_page, page_count, page_count_by_tag, page_of, page_of_tag, page_slug, ranked, recent,
};
pub use raw::{Page, RawBlock, RawDatabase, RawFile, RawPage, RawRichText};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use blockfeed_shared::{FetchConfig, NoProbe};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn load_fixture(name: &str) -> serde_json::Value {
        let path = format!("../../../fixtures/notion/{name}");
        let content = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing fixture: {path}"));
        serde_json::from_str(&content).expect("parse fixture")
    }

    fn config(server: &MockServer) -> FetchConfig {
        FetchConfig {
            api_base: server.uri(),
            api_version: "2022-06-28".into(),
            token: "secret_test".into(),
            database_id: "db1".into(),
            retries: 2,
            retry_min_delay: Duration::ZERO,
            rate_limit: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            page_size: 100,
            snapshot_dir: None,
            utc_offset_hours: 9,
            fast_mode: true,
        }
    }

    // -----------------------------------------------------------------------
    // Query → posts
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn queried_pages_become_valid_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/databases/db1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": load_fixture("pages.json"), "has_more": false, "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server);
        let client = FetchClient::from_config(NotionApi::new(&config).unwrap(), &config);
        let pages = client.all_pages().await.unwrap();
        assert_eq!(pages.len(), 6);

        let mut posts = Vec::new();
        for page in pages.iter().filter(|p| is_valid_page(p)) {
            posts.push(build_post(page, &NoProbe).await);
        }
        let slugs: Vec<&str> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, ["hello-world", "second-post", "profile"]);
        assert_eq!(blog_posts(&posts).len(), 2);
    }

    #[tokio::test]
    async fn database_record_is_retrieved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/databases/db1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_fixture("database.json")))
            .mount(&server)
            .await;

        let config = config(&server);
        let client = FetchClient::from_config(NotionApi::new(&config).unwrap(), &config);
        let db = build_database(&client.database().await.unwrap());
        assert_eq!(db.title, "Field Notes");
        assert!(db.icon.is_some());
    }

    #[tokio::test]
    async fn single_block_is_normalized() {
        let server = MockServer::start().await;
        let blocks = load_fixture("blocks.json");
        Mock::given(method("GET"))
            .and(path("/blocks/callout-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(blocks[3].clone()))
            .mount(&server)
            .await;

        let config = config(&server);
        let client = FetchClient::from_config(NotionApi::new(&config).unwrap(), &config);
        let assembler = Assembler::new(client, Normalizer::new(NoProbe));
        let block = assembler.block("callout-1").await.unwrap();
        assert_eq!(block.block_type, "callout");
        assert_eq!(blockfeed_shared::plain_text(block.rich_texts().unwrap()), "Note");
    }
}
