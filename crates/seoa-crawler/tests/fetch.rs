mod common;

use std::io::Write;

use common::{fast_config, serve, StubResponse};
use flate2::write::GzEncoder;
use flate2::Compression;
use seoa_crawler::{CrawlerConfig, FetchError, OnError, WebCrawler};

#[tokio::test]
async fn retries_rate_limited_requests() {
    let server = serve(|_, hit| {
        if hit < 2 {
            StubResponse::Reply {
                status: 429,
                headers: vec![("Retry-After", "0".into())],
                body: vec![],
            }
        } else {
            StubResponse::ok("<html><title>ok</title></html>")
        }
    })
    .await;

    let crawler = WebCrawler::new(fast_config(3)).unwrap();
    let res = crawler.fetch_page(&server.url("/")).await;

    assert!(res.is_success());
    assert_eq!(res.status_code, 200);
    assert_eq!(res.attempts, 3);
    assert_eq!(res.html(), Some("<html><title>ok</title></html>"));
    assert_eq!(res.content_length, 30);
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = serve(|_, _| StubResponse::status(429)).await;

    let crawler = WebCrawler::new(fast_config(2)).unwrap();
    let res = crawler.fetch_page(&server.url("/")).await;

    assert!(!res.is_success());
    assert_eq!(res.status_code, 429);
    assert_eq!(res.attempts, 3);
    assert_eq!(
        res.error_message.as_deref(),
        Some("HTTP Error: Too Many Requests")
    );
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn server_errors_are_retried_client_errors_are_not() {
    let server = serve(|path, _| match path {
        "/missing" => StubResponse::status(404),
        _ => StubResponse::status(503),
    })
    .await;
    let crawler = WebCrawler::new(fast_config(1)).unwrap();

    let res = crawler.fetch_page(&server.url("/missing")).await;
    assert_eq!(res.attempts, 1);
    assert_eq!(res.error_message.as_deref(), Some("HTTP Error: Not Found"));

    let err = crawler.try_fetch(&server.url("/down")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = serve(|_, _| StubResponse::Hang).await;

    let crawler = WebCrawler::new(fast_config(0)).unwrap();
    let res = crawler.fetch_page(&server.url("/")).await;

    assert_eq!(res.status_code, 408);
    assert_eq!(res.error_message.as_deref(), Some("Request timed out."));
}

#[tokio::test]
async fn gzip_documents_are_decoded() {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(b"User-agent: *\nDisallow: /admin\n").unwrap();
    let compressed = gz.finish().unwrap();

    let server = serve(move |_, _| StubResponse::Reply {
        status: 200,
        headers: vec![("Content-Type", "application/x-gzip".into())],
        body: compressed.clone(),
    })
    .await;

    let crawler = WebCrawler::new(CrawlerConfig::default()).unwrap();
    let page = crawler.try_fetch(&server.url("/robots.txt.gz")).await.unwrap();

    assert_eq!(page.body, "User-agent: *\nDisallow: /admin\n");
    assert_eq!(page.content_type.as_deref(), Some("application/x-gzip"));
}

#[tokio::test]
async fn fetch_all_keeps_order_and_skips_failures() {
    let server = serve(|path, _| match path {
        "/broken" => StubResponse::status(410),
        p => StubResponse::ok(p),
    })
    .await;

    let crawler = WebCrawler::new(fast_config(0)).unwrap();
    let urls = ["/a", "/broken", "/c"].map(|p| server.url(p));
    let results = crawler.fetch_all(urls.clone()).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].html(), Some("/a"));
    assert_eq!(results[1].status_code, 410);
    assert!(results[1].error_message.is_some());
    assert_eq!(results[2].html(), Some("/c"));
    assert_eq!(results[2].url, urls[2]);
}

#[tokio::test]
async fn fetch_all_fails_fast_when_configured() {
    let server = serve(|path, _| match path {
        "/broken" => StubResponse::status(404),
        p => StubResponse::ok(p),
    })
    .await;

    let crawler = WebCrawler::new(CrawlerConfig {
        on_dl_error: OnError::Fail,
        ..fast_config(0)
    })
    .unwrap();
    let err = crawler
        .fetch_all(["/a", "/broken"].map(|p| server.url(p)))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("/broken"));
}
