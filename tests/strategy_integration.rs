//! Discovery strategy tests: paging, retry-then-abandon, walk depth.

use std::time::Duration;

use harvester_core::catalog::{PAGE_SIZE, RetryPolicy};
use harvester_core::{
    AssetClient, CatalogClient, CatalogEndpoints, ConcurrencyGate, HarvestPolicy, HarvestSession,
    Orientation, SearchDescriptor, SessionConfig,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn image_bytes() -> Vec<u8> {
    vec![0xCD; 2048]
}

fn record(server: &MockServer, id: &str, width: u32, height: u32, bookmarks: Option<u64>) -> Value {
    let mut value = json!({
        "id": id,
        "type": "illust",
        "imageUrls": [{"original": format!("{}/img/{id}_p0.jpg", server.uri())}],
        "width": width,
        "height": height,
        "tags": []
    });
    if let Some(count) = bookmarks {
        value["totalBookmarks"] = json!(count);
    }
    value
}

async fn mount_asset(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/img/{id}_p0.jpg")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(image_bytes()))
        .mount(server)
        .await;
}

fn build_session(
    server: &MockServer,
    descriptor: SearchDescriptor,
    policy: HarvestPolicy,
    output_root: &std::path::Path,
) -> HarvestSession {
    let http = reqwest::Client::new();
    let base = Url::parse(&server.uri()).expect("mock server uri parses");
    let catalog = CatalogClient::new(
        http.clone(),
        CatalogEndpoints::new(base).expect("endpoints build"),
        "token-abc123".to_owned(),
        ConcurrencyGate::new(5),
    )
    .with_retry(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(20),
    });
    let assets = AssetClient::new(http, format!("{}/artworks/", server.uri()));
    let config = SessionConfig::new(descriptor, policy, output_root.to_path_buf());
    HarvestSession::new(config, catalog, assets)
}

fn wide_only_policy() -> HarvestPolicy {
    HarvestPolicy {
        orientations: vec![Orientation::Wide],
        ..HarvestPolicy::default()
    }
}

#[tokio::test]
async fn test_search_page_retries_transient_failures() {
    let server = MockServer::start().await;

    // First two attempts at page 1 fail; the third succeeds. The retry
    // bound (3 attempts, fixed delay) absorbs the flakes without abandoning
    // the page.
    Mock::given(method("GET"))
        .and(path("/illustrations"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/illustrations"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": [record(&server, "50", 2000, 1000, Some(5000))],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_asset(&server, "50").await;

    let temp = TempDir::new().expect("temp dir");
    let session = build_session(
        &server,
        SearchDescriptor::Keyword("sunset".into()),
        wide_only_policy(),
        temp.path(),
    );
    let stats = session.run().await.expect("session runs");
    assert_eq!(stats.downloaded(), 1, "page succeeds within the retry bound");
}

#[tokio::test]
async fn test_keyword_pages_until_total_exhausted() {
    let server = MockServer::start().await;

    // Page 1 is full (30 records), page 2 is short; total says two pages.
    let page_one: Vec<Value> = (0..PAGE_SIZE)
        .map(|i| record(&server, &format!("1{i:03}"), 800, 600, Some(5000)))
        .collect();
    let page_two = vec![record(&server, "2000", 800, 600, Some(5000))];

    Mock::given(method("GET"))
        .and(path("/illustrations"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": page_one, "total": PAGE_SIZE + 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/illustrations"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": page_two, "total": PAGE_SIZE + 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    // Policy rejects everything (all records are small): this test is about
    // paging, not downloads.
    let session = build_session(
        &server,
        SearchDescriptor::Keyword("sunset".into()),
        wide_only_policy(),
        temp.path(),
    );
    let stats = session.run().await.expect("session runs");
    assert_eq!(stats.downloaded(), 0);

    let search_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|req| req.url.path() == "/illustrations")
        .count();
    assert_eq!(search_calls, 2, "no page is fetched past the known total");
}

#[tokio::test]
async fn test_geometry_rejected_record_skips_popularity_fetch() {
    let server = MockServer::start().await;

    // 600x400 is below the size floors, and the listing elides the bookmark
    // count. The geometry rejection must come first: no detail fetch.
    let records = vec![record(&server, "60", 600, 400, None)];
    Mock::given(method("GET"))
        .and(path("/illustrations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": records, "total": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/illusts/60"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustration": record(&server, "60", 600, 400, Some(5000))
        })))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let session = build_session(
        &server,
        SearchDescriptor::Keyword("sunset".into()),
        wide_only_policy(),
        temp.path(),
    );
    let stats = session.run().await.expect("session runs");
    assert_eq!(stats.downloaded(), 0);

    let detail_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|req| req.url.path() == "/illusts/60")
        .count();
    assert_eq!(
        detail_calls, 0,
        "a record rejected on geometry must not cost a popularity fetch"
    );
}

#[tokio::test]
async fn test_walk_depth_limits_related_fetches() {
    let server = MockServer::start().await;

    // Chain 1 -> 2 -> 3: with walk depth 1, node 2 (depth 0) still emits
    // its related records, but node 3's own listing is never fetched.
    Mock::given(method("GET"))
        .and(path("/illusts/1/related"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": [record(&server, "2", 2000, 1000, Some(5000))]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/illusts/2/related"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "illustrations": [record(&server, "3", 2000, 1000, None)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/illusts/3/related"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"illustrations": []})))
        .expect(0)
        .mount(&server)
        .await;
    mount_asset(&server, "2").await;
    mount_asset(&server, "3").await;

    let temp = TempDir::new().expect("temp dir");
    let policy = HarvestPolicy {
        walk_depth: 1,
        ..wide_only_policy()
    };
    let session = build_session(
        &server,
        SearchDescriptor::Related(vec!["1".into()]),
        policy,
        temp.path(),
    );
    let stats = session.run().await.expect("session runs");

    // Node 3 has no inline bookmark count: the deep-walk popularity skip
    // accepts it without a detail fetch.
    assert_eq!(stats.downloaded(), 2);
    let detail_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|req| req.url.path() == "/illusts/3")
        .count();
    assert_eq!(detail_calls, 0, "deep candidates skip the popularity fetch");
}

#[tokio::test]
async fn test_author_enumeration_stops_on_short_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/artists/77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "minna"})))
        .mount(&server)
        .await;

    let full_page: Vec<Value> = (0..PAGE_SIZE)
        .map(|i| record(&server, &format!("9{i:03}"), 800, 600, Some(5000)))
        .collect();
    let short_page = vec![record(&server, "9900", 2000, 1000, Some(5000))];

    Mock::given(method("GET"))
        .and(path("/artists/77/illusts"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"illustrations": full_page})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/artists/77/illusts"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"illustrations": short_page})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_asset(&server, "9900").await;

    let temp = TempDir::new().expect("temp dir");
    let session = build_session(
        &server,
        SearchDescriptor::Author("77".into()),
        wide_only_policy(),
        temp.path(),
    );
    let stats = session.run().await.expect("session runs");

    assert_eq!(stats.downloaded(), 1);
    assert!(
        temp.path().join("minna/wide/9900.jpg").exists(),
        "author name roots the bucket path"
    );

    let listing_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|req| req.url.path() == "/artists/77/illusts")
        .count();
    assert_eq!(listing_calls, 2, "short page ends the enumeration");
}
