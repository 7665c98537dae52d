//! Integration tests for the HTTP `Fetcher` retry and blocking policy.
//!
//! Every test stands up a local `wiremock` server; no real network traffic.

use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listing_scout::error::FetchError;
use listing_scout::{CrawlConfig, Fetcher, PageSource};

fn test_fetcher(max_retries: u32) -> Fetcher {
    let mut config = CrawlConfig::new("http://127.0.0.1/", "unused.jsonl");
    config.request_delay_ms = 0;
    config.backoff_base_ms = 1;
    config.max_retries = max_retries;
    config.timeout_secs = 5;
    Fetcher::new(&config).expect("failed to build test Fetcher")
}

#[tokio::test]
async fn sends_browser_like_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .and(header_exists("user-agent"))
        .and(header_exists("accept-language"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let page = test_fetcher(0)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.body, "<html>ok</html>");
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>third time</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let page = test_fetcher(2)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap();
    assert!(page.body.contains("third time"));
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = test_fetcher(2)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn forbidden_is_blocked_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_fetcher(3)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_blocked(), "got {err:?}");
}

#[tokio::test]
async fn captcha_body_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><script src="https://geo.captcha-delivery.com/captcha/"></script></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_fetcher(3)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Blocked { .. }), "got {err:?}");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_fetcher(3)
        .fetch_page(&format!("{}/search/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http { status: 404, .. }), "got {err:?}");
}
