mod common;

use std::cell::RefCell;
use std::time::Duration;

use common::RecordingPacer;
use httpmock::Mock;
use httpmock::prelude::*;
use promo_poster::ExtractError;
use promo_poster::config::ExtractionConfig;
use promo_poster::extractor::{Extractor, HttpProductSource, ProductPageSource};
use promo_poster::fetcher::{PageFetcher, RedirectResolver, build_client};
use promo_poster::pacing::{DelayWindow, NoPacer, Pacer};
use url::Url;

const NO_DELAY: DelayWindow = DelayWindow::new(0, 0);
const HOP_DELAY: DelayWindow = DelayWindow::new(500, 1500);
const PRE_FETCH_DELAY: DelayWindow = DelayWindow::new(1000, 3000);

fn resolver(max_hops: usize) -> RedirectResolver<NoPacer> {
    let client = build_client(Duration::from_secs(5)).unwrap();
    RedirectResolver::new(client, NoPacer, max_hops, NO_DELAY)
}

fn fetcher() -> PageFetcher<NoPacer> {
    let client = build_client(Duration::from_secs(5)).unwrap();
    PageFetcher::new(client, NoPacer, NO_DELAY)
}

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

#[test]
fn redirect_loop_stops_at_hop_cap() {
    let server = MockServer::start();
    let a = server.mock(|when, then| {
        when.method(GET).path("/a");
        then.status(302).header("Location", "/b");
    });
    let b = server.mock(|when, then| {
        when.method(GET).path("/b");
        then.status(302).header("Location", "/a");
    });

    let resolution = resolver(5).resolve(&url(&server.url("/a")));

    assert_eq!(resolution.hops, 5);
    assert_eq!(resolution.final_url.path(), "/b");
    assert_eq!(resolution.chain.urls().len(), 6);
    // the last hop target is never requested
    assert_eq!(a.hits() + b.hits(), 5);
}

#[test]
fn follows_absolute_and_relative_locations() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/s/abc");
        then.status(301).header("Location", server.url("/redirect/step"));
    });
    server.mock(|when, then| {
        when.method(GET).path("/redirect/step");
        then.status(307).header("Location", "../dp/B0TEST?tag=aff");
    });
    server.mock(|when, then| {
        when.method(GET).path("/dp/B0TEST");
        then.status(200).body("<html></html>");
    });

    let resolution = resolver(5).resolve(&url(&server.url("/s/abc")));

    assert_eq!(resolution.hops, 2);
    assert_eq!(resolution.final_url.path(), "/dp/B0TEST");
    assert_eq!(resolution.final_url.query(), Some("tag=aff"));
}

#[test]
fn non_redirect_status_ends_resolution() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/multi");
        then.status(300).header("Location", "/elsewhere");
    });

    let start = url(&server.url("/multi"));
    let resolution = resolver(5).resolve(&start);

    assert_eq!(resolution.hops, 0);
    assert_eq!(resolution.final_url, start);
}

#[test]
fn network_error_mid_chain_keeps_last_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/go");
        then.status(302).header("Location", "http://127.0.0.1:9/unreachable");
    });

    let resolution = resolver(5).resolve(&url(&server.url("/go")));

    assert_eq!(resolution.hops, 1);
    assert_eq!(resolution.final_url.as_str(), "http://127.0.0.1:9/unreachable");
}

#[test]
fn fetch_sends_browser_headers_and_returns_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/dp/1")
            .header("sec-fetch-mode", "navigate")
            .header("referer", "https://www.google.com/")
            .header("cache-control", "no-cache");
        then.status(200).body("<h1>ok</h1>");
    });

    let page = fetcher().fetch(&url(&server.url("/dp/1"))).unwrap();

    mock.assert();
    assert_eq!(page.status, 200);
    assert_eq!(page.body, "<h1>ok</h1>");
}

#[test]
fn fetch_rejects_non_200() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/dp/1");
        then.status(503);
    });

    let err = fetcher().fetch(&url(&server.url("/dp/1"))).unwrap_err();

    assert!(matches!(err, ExtractError::UnexpectedStatus { status: 503, .. }));
    assert!(err.is_retryable());
}

#[test]
fn resolver_pauses_after_every_hop() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/s/short");
        then.status(302).header("Location", "/mid");
    });
    server.mock(|when, then| {
        when.method(GET).path("/mid");
        then.status(301).header("Location", "/dp/B0PACE");
    });
    server.mock(|when, then| {
        when.method(GET).path("/dp/B0PACE");
        then.status(200).body("<html></html>");
    });

    let pacer = RecordingPacer::default();
    let client = build_client(Duration::from_secs(5)).unwrap();
    let resolution = RedirectResolver::new(client, &pacer, 5, HOP_DELAY)
        .resolve(&url(&server.url("/s/short")));

    assert_eq!(resolution.hops, 2);
    assert_eq!(*pacer.pauses.borrow(), vec![HOP_DELAY, HOP_DELAY]);
}

/// Notes how many requests the mock had already served at each pause.
struct HitsAtPause<'a> {
    mock: &'a Mock<'a>,
    seen: RefCell<Vec<(DelayWindow, usize)>>,
}

impl Pacer for HitsAtPause<'_> {
    fn pause(&self, window: &DelayWindow) {
        self.seen.borrow_mut().push((*window, self.mock.hits()));
    }
}

#[test]
fn fetcher_pauses_once_before_the_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/dp/1");
        then.status(200).body("<h1>ok</h1>");
    });

    let pacer = HitsAtPause {
        mock: &mock,
        seen: RefCell::new(Vec::new()),
    };
    let client = build_client(Duration::from_secs(5)).unwrap();
    PageFetcher::new(client, &pacer, PRE_FETCH_DELAY)
        .fetch(&url(&server.url("/dp/1")))
        .unwrap();

    assert_eq!(*pacer.seen.borrow(), vec![(PRE_FETCH_DELAY, 0)]);
    mock.assert();
}

#[test]
fn invalid_url_is_reported_not_fetched() {
    let source = HttpProductSource::new(&ExtractionConfig::default(), NoPacer).unwrap();
    let err = source.load("not a url").unwrap_err();
    assert!(matches!(err, ExtractError::InvalidUrl { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn affiliate_link_end_to_end() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/aff/xyz");
        then.status(302).header("Location", "/dp/B0KETTLE");
    });
    let product = server.mock(|when, then| {
        when.method(GET).path("/dp/B0KETTLE");
        then.status(200).body(
            r#"<html><body>
                <span id="productTitle"> Electric Kettle 1.7L </span>
                <span class="a-price-whole">39.</span>
                <img id="landingImage" src="/images/I/61kettle._AC_SX300_.jpg"
                     data-old-hires="/images/I/61kettle._AC_SL1500_.jpg">
            </body></html>"#,
        );
    });

    let config = ExtractionConfig {
        max_retries: 2,
        ..ExtractionConfig::default()
    };
    let source = HttpProductSource::new(&config, NoPacer).unwrap();
    let extractor = Extractor::from_config(source, NoPacer, &config);

    let report = extractor.extract_with_report(&server.url("/aff/xyz"));

    assert!(report.succeeded);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.record.name, "Electric Kettle 1.7L");
    assert_eq!(report.record.price, "39.");
    assert_eq!(
        report.record.image_url,
        Some(format!("https://{}/images/I/61kettle.jpg", server.address()))
    );
    // the resolver's first request plus the real fetch
    assert_eq!(product.hits(), 2);
}

#[test]
fn blocked_page_exhausts_retries_without_panicking() {
    let server = MockServer::start();
    let blocked = server.mock(|when, then| {
        when.method(GET).path("/dp/blocked");
        then.status(503).body("captcha");
    });

    let config = ExtractionConfig {
        max_retries: 3,
        ..ExtractionConfig::default()
    };
    let source = HttpProductSource::new(&config, NoPacer).unwrap();
    let extractor = Extractor::from_config(source, NoPacer, &config);

    let record = extractor.extract(&server.url("/dp/blocked"));

    assert_eq!(record, promo_poster::ProductRecord::unknown());
    // each attempt: one resolver request, one fetch
    assert_eq!(blocked.hits(), 6);
}
